pub mod compare;
pub mod leafs;
pub mod pull;
pub mod push;
