#![forbid(unsafe_code)]

//! Domain vocabulary for therapy-session evaluation: ids, session headers,
//! the resolved protocol tree and the evaluation index.

pub mod model;
pub mod time;

pub use time::Clock;
