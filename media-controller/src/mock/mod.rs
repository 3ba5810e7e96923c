//! In-process doubles for the element, the transport adapters and the URL
//! probe. Deterministic, and driven entirely by the caller.

pub mod element;
pub mod probe;
pub mod transport;

pub use element::MockMediaElement;
pub use probe::MockUrlProbe;
pub use transport::{MockSession, MockTransport, SessionBehavior, StartDetails};
