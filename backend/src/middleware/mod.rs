pub mod response;

pub use response::wrap_response_middleware;
