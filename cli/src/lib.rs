//! `parking` command line.

pub mod spot_cmd;

pub use spot_cmd::ParkingCli;
