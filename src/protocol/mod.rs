//! WebSocket protocol core (RFC 6455): framing, masking, close codes and the
//! opening handshake. Everything here is sans-IO.

pub mod close;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod receiver;
pub mod sender;

pub use close::{CloseCode, is_valid_status_code};
pub use handshake::{
    UpgradeRequest, UpgradeResponse, WS_GUID, compute_accept_key, generate_key,
};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
pub use receiver::{FrameReceiver, ReceiverEvent};
pub use sender::{FrameSender, SendOptions, make_frame};
