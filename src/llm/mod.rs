pub mod oracle;

pub use oracle::{HttpOracle, Oracle, OracleConfig, OracleError, propose_with_timeout};
