pub mod scheduling_tools;
