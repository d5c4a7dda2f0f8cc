//! Release index test utilities

use std::io::Write;

use mockito::{Matcher, Mock, Server, ServerGuard};
use zip::write::SimpleFileOptions;

use tfmatrix::version::platform::Platform;

/// Build an in-memory zip archive from (name, content) pairs
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Mock release index serving listings, build descriptors and archives
pub struct ReleaseServer {
    pub server: ServerGuard,
}

impl ReleaseServer {
    pub async fn start() -> Self {
        Self {
            server: Server::new_async().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Serve `versions` as a single listing page followed by an empty page
    pub async fn with_listing(&mut self, release: &str, versions: &[&str]) -> Vec<Mock> {
        let entries: Vec<_> = versions
            .iter()
            .enumerate()
            .map(|(i, version)| {
                serde_json::json!({
                    "version": version,
                    "timestamp_created": format!("2024-01-{:02}T00:00:00.000Z", 28 - i),
                })
            })
            .collect();
        let cursor = format!("2024-01-{:02}T00:00:00.000Z", 28 - (versions.len().max(1) - 1));

        let first = self
            .server
            .mock("GET", format!("/{release}").as_str())
            .match_query(Matcher::Exact("limit=20".into()))
            .with_status(200)
            .with_body(serde_json::Value::Array(entries).to_string())
            .create_async()
            .await;
        let last = self
            .server
            .mock("GET", format!("/{release}").as_str())
            .match_query(Matcher::UrlEncoded("after".into(), cursor))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        vec![first, last]
    }

    /// Serve the build descriptor and archive of one release version
    pub async fn with_build(
        &mut self,
        release: &str,
        version: &str,
        platform: &Platform,
        archive: Vec<u8>,
    ) -> (Mock, Mock) {
        let archive_path = format!("/download/{release}_{version}.zip");
        let descriptor = serde_json::json!({
            "builds": [
                { "os": "plan9", "arch": "mips", "url": format!("{}/download/wrong.zip", self.url()) },
                { "os": platform.os, "arch": platform.arch, "url": format!("{}{}", self.url(), archive_path) },
            ]
        });

        let descriptor_mock = self
            .server
            .mock("GET", format!("/{release}/{version}").as_str())
            .with_status(200)
            .with_body(descriptor.to_string())
            .create_async()
            .await;
        let archive_mock = self
            .server
            .mock("GET", archive_path.as_str())
            .with_status(200)
            .with_body(archive)
            .create_async()
            .await;

        (descriptor_mock, archive_mock)
    }
}
