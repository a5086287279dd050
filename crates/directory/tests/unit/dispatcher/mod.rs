/// Error reporting for malformed or out-of-place events.
pub mod errors;


/// Controllers wired to mocked links.
pub mod links;



/// End-to-end request flows.
pub mod scenarios;

/// Invalidations and fetches originated by memory.
pub mod shootdowns;
