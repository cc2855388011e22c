pub mod api;
pub mod application;
pub mod artifact_store;
pub mod backup;
pub mod cancel;
pub mod engine;
pub mod engine_config;
pub mod fetch;
pub mod gateway;
pub mod kind;
pub mod restore;
pub mod result_error;
pub mod retry;
pub mod validate;
pub mod worker_pool;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
