//! Domain model: runs, libraries, and year partitioning.

pub mod library;
pub mod run;

pub use library::{
    current_two_digit_year, find_read_file, library_year, symlink_destinations, year_partition,
};
pub use run::{instrument_class, is_run_id, is_upload_complete, run_id_of, InstrumentClass};
