pub mod config;
pub mod error;
pub mod media;
pub mod protocol;
pub mod session;
pub mod transcoder;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use media::{MediaKind, MediaStreamDescriptor, RtpParameters, derive_codec_descriptor};
pub use protocol::render_sdp;
pub use session::{ProcessExit, SessionManager, StopHandle, TranscodeSession};
pub use transcoder::{Ffmpeg, Transcoder, TranscoderArgs};
pub use transport::{PortAllocator, PortPair, RelayEndpoint};
