pub(crate) mod scp;
