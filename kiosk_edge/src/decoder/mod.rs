//! Everything that speaks the pulse decoder's line protocol.
pub mod protocol;
pub mod pulse;
pub mod virtual_link;

pub use protocol::{classify_line, CashKind, DecoderCommand, DecoderLine, StatusLine, MAX_COMMAND_LEN};
pub use pulse::{DecoderCounters, PulseDecoder, PulseDecoderConfig};
pub use virtual_link::VirtualAcceptor;
