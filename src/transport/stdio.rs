// ! STDIO transport implementation for MCP
// !
// ! The server side of a process launched by an MCP client: requests arrive on
// ! stdin and replies go to stdout, one JSON document per line.

use tokio::io::{Stdin, Stdout};

use crate::transport::line::LineTransport;
use crate::transport::traits::TransportConfig;

/// STDIO transport for MCP servers
pub type StdioServerTransport = LineTransport<Stdin, Stdout>;

impl LineTransport<Stdin, Stdout> {
    /// Transport over the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::stdio_with_config(TransportConfig::default())
    }

    pub fn stdio_with_config(config: TransportConfig) -> Self {
        Self::with_config(tokio::io::stdin(), tokio::io::stdout(), config).with_kind("stdio")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::traits::ServerTransport;

    #[tokio::test]
    async fn test_stdio_transport_creation() {
        let transport = StdioServerTransport::stdio();
        assert_eq!(transport.kind(), "stdio");
        assert!(!transport.is_running());
        assert!(!transport.client_id().is_empty());
    }
}
