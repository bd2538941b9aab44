pub(crate) mod coordinator;
mod worker;
