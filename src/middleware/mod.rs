use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::session::Session;

/// Заголовок, которым клиент представляется (одна вкладка браузера).
pub const SESSION_HEADER: &str = "x-session-id";

/// Сессия текущего запроса. Создаётся при первом обращении с новым id.
#[derive(Clone)]
pub struct CurrentSession(pub Arc<Session>);

impl std::ops::Deref for CurrentSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

impl FromRequestParts<Arc<crate::AppState>> for CurrentSession {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or((StatusCode::BAD_REQUEST, "missing X-Session-Id header"))?;

        // Только UUID: id становится частью ключей хранилища
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| (StatusCode::BAD_REQUEST, "X-Session-Id must be a UUID"))?;

        Ok(CurrentSession(state.sessions.get_or_create(id).await))
    }
}
