//! Domain model: signatures, their arguments and headers, and the
//! operations that copy, migrate and compose them.

pub mod arg;
pub mod copy;
pub mod errors;
pub mod headers;
pub mod ids;
pub mod legacy;
pub mod signature;
pub mod workflow;

pub use arg::{Arg, ArgError, ArgValue};
pub use copy::{CopyLimits, copy_signature, copy_signature_with, copy_signatures};
pub use errors::{ErrorKind, SignatureError};
pub use headers::{Headers, LegacyHeaders, PropagationError, TextMapReader, TextMapWriter};
pub use ids::{GroupId, SignatureId};
pub use legacy::{LegacySignature, convert_to_current_schema};
pub use signature::Signature;
pub use workflow::{Chord, Group, chain};
