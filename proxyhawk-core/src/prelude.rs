pub use arcstr::ArcStr as Strng;
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};
pub use tracing::{debug, error, info, trace, warn};

pub(crate) fn strng(s: impl AsRef<str>) -> Strng {
	Strng::from(s.as_ref())
}
