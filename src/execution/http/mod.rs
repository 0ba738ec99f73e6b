//! HTTP plumbing: the transport seam, its reqwest implementation, request
//! assembly and the interceptor chain.

pub mod builder;
pub mod client;
pub mod interceptor;
pub mod transport;

pub use builder::{ParamProvider, RequestAssembler};
pub use client::ReqwestTransport;
pub use interceptor::{
    FnAdapter, InterceptorChain, LoggingInterceptor, RequestAdapter, RequestContext,
    ResponseObserver, StaticHeadersAdapter, generate_request_id,
};
pub use transport::{Transport, TransportError};
