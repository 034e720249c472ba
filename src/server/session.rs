// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 会话: cookie 中的会话ID → 已上传文件路径
//!
//! 上传成功时创建/更新, 请求视频流时读取. 条目不会过期.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use parking_lot::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    uploads: Arc<RwLock<HashMap<String, PathBuf>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_path(&self, session_id: &str) -> Option<PathBuf> {
        self.uploads.read().get(session_id).cloned()
    }

    pub fn set_file_path(&self, session_id: &str, path: PathBuf) {
        self.uploads.write().insert(session_id.to_string(), path);
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.uploads.read().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.uploads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 从 Cookie 头读取会话ID
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `Set-Cookie` 头的值
pub fn session_cookie(session_id: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_id_from_cookies() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=abc123; x=1"));
        assert_eq!(session_id(&headers).as_deref(), Some("abc123"));

        headers.insert(COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_id(&headers), None);
    }

    #[test]
    fn test_store() {
        let store = SessionStore::new();
        let id = new_session_id();
        assert_eq!(id.len(), 32);
        assert!(store.file_path(&id).is_none());
        assert!(!store.contains(&id));
        store.set_file_path(&id, PathBuf::from("static/files/a.mp4"));
        store.set_file_path(&id, PathBuf::from("static/files/b.mp4"));
        assert_eq!(store.file_path(&id), Some(PathBuf::from("static/files/b.mp4")));
        assert_eq!(store.len(), 1);
        assert!(store.contains(&id));
        assert_eq!(
            session_cookie(&id),
            format!("session={}; Path=/; HttpOnly; SameSite=Lax", id)
        );
    }
}
