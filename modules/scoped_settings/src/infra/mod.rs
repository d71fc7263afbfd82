//! Infrastructure layer - storage technologies behind the format backend traits

pub mod storage;
