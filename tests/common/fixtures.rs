//! Workspace fixtures and HTTP mocks

use super::Workspace;
use std::io::Write;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Root `R` ("Workspace") with a leaf `L1` and an empty branch `L2`
pub fn small_workspace() -> Workspace {
    Workspace::default()
        .brain("brain-1", "R", "Team")
        .cell("R", "Workspace", "TREE", &["L1", "L2"])
        .cell("L1", "Getting started", "LEAF", &[])
        .cell("L2", "Archive", "TREE", &[])
}

/// Refresh endpoint handing out `token`
pub async fn mock_refresh(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/users/me/refresh-session"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("token={token}; Path=/; HttpOnly").as_str()),
        )
        .mount(server)
        .await;
}

/// Leaf export endpoint for `id` in Markdown
pub async fn mock_leaf(server: &MockServer, id: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/export/cells/{id}.md")))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// ZIP archive holding the given files
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}
