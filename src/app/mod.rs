pub mod ports;
pub mod run_use_case;
