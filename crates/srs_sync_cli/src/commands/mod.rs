pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod queue;
pub(crate) mod run;
pub(crate) mod session;
pub(crate) mod shared;
pub(crate) mod status;
