#![cfg_attr(feature = "failfast", allow(unreachable_code))]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

mod boundary;
mod error;
mod executable;
mod executor;
mod gateway;
mod json_ext;
mod plan;
mod planner;
mod request;
mod response;
mod shaper;
mod spec;
mod supergraph;

pub use boundary::*;
pub use error::*;
pub use executable::*;
pub use executor::*;
pub use gateway::*;
pub use json_ext::*;
pub use plan::*;
pub use planner::*;
pub use request::*;
pub use response::*;
pub use shaper::*;
pub use spec::*;
pub use supergraph::*;

pub mod prelude {
    // NOTE: only traits can be added here! Everything else should be scoped under the module
    //       graphql so the user can use, for example:
    //        -  graphql::Supergraph to get a stitched schema registry
    //        -  graphql::Request to get a GraphQL Request
    //        -  graphql::Response to get a GraphQL Response
    //        -  ...
    //
    //      This is because the user might work with HTTP requests alongside GraphQL requests so we
    //      thought it might be handy to have everything under the namespace "graphql" and let
    //      the user imports things explicitly if they prefer to.
    pub use crate::executable::Executable;
    pub mod graphql {
        pub use crate::*;
    }
}

pub mod reexports {
    pub use serde_json;
}
