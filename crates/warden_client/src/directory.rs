//! The remote file-access handler shared by wrapper and kickstarter roles.
//!
//! The core requests a confined directory snapshot with
//! `Directory-Access { "request": tag, "path": relative }`; the reply goes
//! back under the request tag so the core can route it to the pending
//! caller. The walk happens off the session's message path, and any
//! containment failure is reported with the protocol's single
//! non-descriptive error string.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use warden_protocol::{snapshot_directory, Protocol};

/// Registers the `Directory-Access` handler, confined to `root`.
pub fn register_directory_access(session: &Arc<Protocol>, root: PathBuf) {
    session.add_command("Directory-Access", move |proto, payload| {
        let Some(request) = payload.get("request").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(path) = payload.get("path").and_then(Value::as_str) else {
            return Ok(());
        };
        let proto = proto.clone();
        let root = root.clone();
        let request = request.to_string();
        let path = path.to_string();
        tokio::spawn(async move {
            let walk_root = root.clone();
            let result = tokio::task::spawn_blocking(move || {
                let target = walk_root.join(&path);
                snapshot_directory(&target, &walk_root)
            })
            .await;
            match result {
                Ok(Ok(files)) => proto.send(&request, json!({ "files": files })),
                Ok(Err(e)) => proto.send(&request, json!({ "error": e.to_string() })),
                Err(_) => proto.send(&request, json!({ "error": "internal error" })),
            }
        });
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use warden_protocol::{Message, Transport};

    async fn reply_for(requested_path: &str, root: PathBuf) -> Value {
        let (near, far) = Transport::pair();
        let session = Protocol::new("wrapper", Arc::new(near));
        register_directory_access(&session, root);
        {
            let session = session.clone();
            tokio::spawn(async move {
                let _ = session.run().await;
            });
        }

        far.send(
            Message::new(
                "Directory-Access",
                json!({ "request": "req-1", "path": requested_path }),
            )
            .encode()
            .unwrap(),
        )
        .unwrap();
        let frame = timeout(Duration::from_secs(2), far.recv())
            .await
            .expect("reply in time")
            .expect("transport open");
        let reply = Message::decode(&frame).unwrap();
        assert_eq!(reply.command, "req-1");
        far.close();
        reply.payload
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serves_confined_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("world")).unwrap();
        std::fs::write(dir.path().join("world/level.dat"), b"bytes").unwrap();

        let payload = reply_for("world", dir.path().to_path_buf()).await;
        assert!(payload.get("files").is_some());
        assert!(payload.get("error").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn escapes_get_the_non_descriptive_error() {
        let dir = tempfile::tempdir().unwrap();

        let traversal = reply_for("../..", dir.path().to_path_buf()).await;
        assert_eq!(traversal["error"], "access denied");

        let missing = reply_for("does-not-exist", dir.path().to_path_buf()).await;
        assert_eq!(missing["error"], "access denied");
    }
}
