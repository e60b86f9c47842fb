#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use keg_pm::{Formula, FormulaTest};
use std::sync::Arc;
use std::thread;

/// Build a gzip-compressed tarball from `(path, content, mode)` entries
pub fn tar_gz(files: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append_data(&mut header, path, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Source archive of a tiny CLI that prints its usage
pub fn demo_archive() -> Vec<u8> {
    tar_gz(&[
        (
            "demo-1.0/demo",
            "#!/bin/sh\necho 'Usage: demo [OPTIONS] COMMAND'\n",
            0o755,
        ),
        ("demo-1.0/README.md", "# demo\n", 0o644),
    ])
}

/// Serve `body` on every path except `/missing`, which answers 404.
/// Returns the base URL.
pub fn serve(body: Vec<u8>) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let body = Arc::new(body);

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let response = if request.url() == "/missing" {
                tiny_http::Response::from_data(Vec::new()).with_status_code(404)
            } else {
                tiny_http::Response::from_data(body.as_ref().clone())
            };
            let _ = request.respond(response);
        }
    });

    format!("http://{}", addr)
}

/// Formula for [`demo_archive`] installed with a shell script
pub fn demo_formula(url: String, sha256: String) -> Formula {
    Formula {
        name: "demo".to_string(),
        desc: Some("Demo CLI".to_string()),
        homepage: None,
        url,
        version: None,
        sha256,
        license: Some("MIT".to_string()),
        runtime_dependency: Some("sh".to_string()),
        install: "cp demo \"$KEG_BIN/demo\"".to_string(),
        test: FormulaTest {
            command: "#{bin}/demo --help".to_string(),
            expected: "Usage: demo".to_string(),
            status: 0,
        },
    }
}

/// Flip one hex character of a digest
pub fn corrupt_digest(digest: &str) -> String {
    let mut chars: Vec<char> = digest.chars().collect();
    chars[10] = if chars[10] == '0' { '1' } else { '0' };
    chars.into_iter().collect()
}
