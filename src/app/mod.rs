pub mod ports;
pub mod collect_use_case;
pub mod load_use_case;
