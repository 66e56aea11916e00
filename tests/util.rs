#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, ensure};
use keytool::key::KeyAlgorithm;
use keytool::key_tool::{KeyTool, KeyToolConfig};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A key tool with cheap key protection, for tests that create many stores.
pub fn key_tool() -> KeyTool {
    key_tool_with(KeyAlgorithm::EcdsaP256)
}

pub fn key_tool_with(key_algorithm: KeyAlgorithm) -> KeyTool {
    KeyTool::with_config(
        KeyToolConfig::builder()
            .key_algorithm(key_algorithm)
            .key_protection_iterations(1_000)
            .mac_iterations(1_000)
            .build(),
    )
}

/// Runs a handshake over an in-memory stream: the client sends "hello", the
/// server answers "goodbye". Returns the client and server outcomes.
pub async fn do_tls_handshake(
    client_config: Arc<ClientConfig>,
    server_config: Arc<ServerConfig>,
    // The DNS name the client expects the server certificate to carry.
    expected_dns: &str,
) -> [Result<(), String>; 2] {
    let (client_stream, server_stream) = tokio::io::duplex(4096);

    let client = async move {
        let connector = tokio_rustls::TlsConnector::from(client_config);
        let sni = ServerName::try_from(expected_dns.to_owned()).context("Bad DNS name")?;
        let mut stream = connector
            .connect(sni, client_stream)
            .await
            .context("Client didn't connect")?;

        stream.write_all(b"hello").await.context("Could not write hello")?;
        stream.flush().await.context("Could not flush")?;
        stream.shutdown().await.context("Could not shutdown")?;

        let mut resp = Vec::new();
        stream.read_to_end(&mut resp).await.context("Read failed")?;
        ensure!(resp == b"goodbye", "Unexpected response: {resp:?}");

        Ok::<_, anyhow::Error>(())
    };

    let server = async move {
        let acceptor = tokio_rustls::TlsAcceptor::from(server_config);
        let mut stream = acceptor
            .accept(server_stream)
            .await
            .context("Server didn't accept")?;

        let mut req = Vec::new();
        stream.read_to_end(&mut req).await.context("Read failed")?;
        ensure!(req == b"hello", "Unexpected request: {req:?}");

        stream.write_all(b"goodbye").await.context("Could not write goodbye")?;
        stream.shutdown().await.context("Could not shutdown")?;

        Ok::<_, anyhow::Error>(())
    };

    let (client_result, server_result) = tokio::join!(client, server);

    let (client_result, server_result) = (
        client_result.map_err(|e| format!("{e:#}")),
        server_result.map_err(|e| format!("{e:#}")),
    );

    println!("Client result: {client_result:?}");
    println!("Server result: {server_result:?}");

    [client_result, server_result]
}
