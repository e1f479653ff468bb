// Native implementations

pub mod http;
pub mod rpc_impl;
pub mod storage_impl;

pub use http::NativeHttpClient;
pub use rpc_impl::NativeRpcClient;
pub use storage_impl::FileStorage;
