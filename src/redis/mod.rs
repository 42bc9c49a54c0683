/// Store-facing pieces: the RESP wire codec and the typed operation set
///
/// - `resp`: RESP2 value type, incremental parser and encoder
/// - `command`: read/write classification table and `Command`
pub mod command;
pub mod resp;

pub use command::{classify, Access, Command, ScoreBound, SetOptions};
pub use resp::{RespEncoder, RespParseError, RespParser, RespValue};
