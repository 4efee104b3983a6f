//! Extraction-stage input: incoming records and batch file readers.

mod incoming;
mod reader;

pub use incoming::{parse_declared_sequence, IncomingRecord};
pub use reader::{read_batch_file, read_delimited_batch, read_json_batch, BatchFormat};
