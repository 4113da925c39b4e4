//! Developer probe binary.
//!
//! Prints core health and schema information so packaging and deployment
//! scripts can verify the library links and migrates cleanly.

use std::process::ExitCode;

use talenttrack_core::db::migrations::latest_version;
use talenttrack_core::db::open_db_in_memory;
use talenttrack_core::{core_version, ping};

fn main() -> ExitCode {
    println!("talenttrack core {} ({})", core_version(), ping());

    match open_db_in_memory() {
        Ok(_) => {
            println!("schema version {}", latest_version());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to open in-memory database: {err}");
            ExitCode::FAILURE
        }
    }
}
