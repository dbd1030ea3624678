pub mod cli_missing;
pub mod demux;
pub mod line_buffer;
