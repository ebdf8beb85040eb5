//! Tests for autograd operations with gradient checking

mod prop_basic;
mod prop_norm;
mod test_utils;
