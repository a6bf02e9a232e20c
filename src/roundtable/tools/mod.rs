//! Built-in tools.
//!
//! - [`Calculator`]: two-operand arithmetic
//! - [`HttpTool`]: one HTTP endpoint with JSON body and query parameters
//! - [`NewsSearcher`]: web news search condensed into a short digest

pub mod calculator;
pub mod http_tool;
pub mod news_search;

pub use calculator::{Calculator, Operation};
pub use http_tool::HttpTool;
pub use news_search::NewsSearcher;
