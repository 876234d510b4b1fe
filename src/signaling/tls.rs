use rustls::{
    ClientConfig, RootCertStore, ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer},
};
use rustls_pemfile::{Item, certs, read_one};
use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
    sync::Arc,
};

/// Loads a certificate chain from a PEM file.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be opened, the PEM content is
/// invalid, or it holds no certificates.
pub fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        io::Error::new(e.kind(), format!("opening cert {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid certs: {e}")))?;

    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} did not contain any certificates", path.display()),
        ));
    }

    Ok(certs)
}

/// Loads a private key from a PEM file.
/// Supports PKCS1, PKCS8, and Sec1 (EC) formats.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be opened, is malformed,
/// or does not contain a private key.
pub fn load_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        io::Error::new(e.kind(), format!("opening key {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    loop {
        match read_one(&mut reader) {
            Ok(Some(Item::Pkcs1Key(key))) => return Ok(key.into()),
            Ok(Some(Item::Pkcs8Key(key))) => return Ok(key.into()),
            Ok(Some(Item::Sec1Key(key))) => return Ok(key.into()),
            Ok(None) => break,
            Ok(Some(_)) => {} // certificates and other items
            Err(e) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("key parse error: {e}"),
                ));
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("no private key found in {}", path.display()),
    ))
}

/// Build a RootCertStore that trusts ONLY the CA(s) in `ca_path`.
fn build_pinned_root_store(ca_path: &Path) -> io::Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        root_store
            .add(cert)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad CA cert: {e}")))?;
    }
    Ok(root_store)
}

/// ClientConfig for the signaling client, pinned to the configured CA.
pub fn build_client_config(ca_path: &Path) -> io::Result<Arc<ClientConfig>> {
    let root_store = build_pinned_root_store(ca_path)?;

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// ServerConfig for the relay: no client auth, one certificate chain.
///
/// Built once at startup; every accepted connection shares the Arc.
pub fn build_server_config(cert_path: &Path, key_path: &Path) -> io::Result<Arc<ServerConfig>> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("TLS config error: {e}"))
        })?;

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("peercall-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_cert_file_keeps_not_found_kind() {
        let err = load_certs(Path::new("/definitely/not/here.pem")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("opening cert"));
    }

    #[test]
    fn pem_without_certificates_is_rejected() {
        let path = temp_file("empty.pem", "# nothing useful here\n");
        let err = load_certs(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn pem_without_key_is_rejected() {
        let path = temp_file("nokey.pem", "just text\n");
        let err = load_private_key(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("no private key"));
    }

    #[test]
    fn client_config_requires_a_ca() {
        let path = temp_file("noca.pem", "");
        assert!(build_client_config(&path).is_err());
    }
}
