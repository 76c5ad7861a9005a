//! REST adapters over the player registry

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use crate::game::state::PlayerState;
use crate::game::upgrade::UpgradeError;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PlayerQuery {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpgradeQuery {
    #[serde(rename = "playerID")]
    pub player_id: Option<String>,
    pub station: Option<String>,
}

/// REST request failures; all map to 400
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Player ID required")]
    MissingPlayerId,
    #[error("PlayerID and station required")]
    MissingUpgradeParams,
    #[error("Upgrade failed - insufficient funds or invalid station")]
    UpgradeFailed(#[from] UpgradeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `GET /api/player?id=` returns the player's state, creating it if needed
pub async fn get_player(
    State(state): State<AppState>,
    Query(query): Query<PlayerQuery>,
) -> Result<Json<PlayerState>, ApiError> {
    let id = non_empty(query.id).ok_or(ApiError::MissingPlayerId)?;
    let player = state.players.get_or_create(&id);
    Ok(Json(player.snapshot()))
}

/// `POST /api/upgrade?playerID=&station=` upgrades one station
pub async fn upgrade_station(
    State(state): State<AppState>,
    Query(query): Query<UpgradeQuery>,
) -> Result<Json<PlayerState>, ApiError> {
    let (Some(player_id), Some(station)) = (non_empty(query.player_id), non_empty(query.station))
    else {
        return Err(ApiError::MissingUpgradeParams);
    };

    let player = state.players.get_or_create(&player_id);
    let result = player.upgrade_by_key(&station);
    state.metrics.record_upgrade(result.is_ok());

    if let Err(e) = result {
        debug!("REST upgrade for {} rejected: {}", player_id, e);
        return Err(e.into());
    }
    Ok(Json(player.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::metrics::Metrics;
    use crate::server::{router, GameServer};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        GameServer::new(ServerConfig::default(), Arc::new(Metrics::new())).state()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_get_player_creates_record() {
        let state = test_state();

        let Json(player) = get_player(
            State(state.clone()),
            Query(PlayerQuery {
                id: Some("abc".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(player.id, "abc");
        assert_eq!(player.progress.dungeon_level, 1);
        assert_eq!(state.players.len(), 1);
    }

    #[tokio::test]
    async fn test_get_player_requires_id() {
        let state = test_state();

        let missing = get_player(State(state.clone()), Query(PlayerQuery::default())).await;
        let empty = get_player(
            State(state.clone()),
            Query(PlayerQuery {
                id: Some(String::new()),
            }),
        )
        .await;

        assert!(matches!(missing, Err(ApiError::MissingPlayerId)));
        assert!(matches!(empty, Err(ApiError::MissingPlayerId)));
        assert!(state.players.is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_station_with_gold() {
        let state = test_state();
        state
            .players
            .get_or_create("p1")
            .update(|p| p.progress.gold = 120);

        let Json(player) = upgrade_station(
            State(state.clone()),
            Query(UpgradeQuery {
                player_id: Some("p1".to_string()),
                station: Some("loot".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(player.progress.gold, 20);
        assert_eq!(player.factory.loot_station.level, 2);
        assert_eq!(state.metrics.upgrades_succeeded.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_upgrade_station_rejections() {
        let state = test_state();

        let broke = upgrade_station(
            State(state.clone()),
            Query(UpgradeQuery {
                player_id: Some("p1".to_string()),
                station: Some("hp".to_string()),
            }),
        )
        .await;
        assert!(matches!(
            broke,
            Err(ApiError::UpgradeFailed(UpgradeError::InsufficientGold { cost: 100, gold: 0 }))
        ));

        let unknown = upgrade_station(
            State(state.clone()),
            Query(UpgradeQuery {
                player_id: Some("p1".to_string()),
                station: Some("mana".to_string()),
            }),
        )
        .await;
        assert!(matches!(
            unknown,
            Err(ApiError::UpgradeFailed(UpgradeError::UnknownStation(_)))
        ));

        let missing = upgrade_station(
            State(state.clone()),
            Query(UpgradeQuery {
                player_id: Some("p1".to_string()),
                station: None,
            }),
        )
        .await;
        assert!(matches!(missing, Err(ApiError::MissingUpgradeParams)));
        assert_eq!(state.metrics.upgrades_failed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_router_get_player() {
        let app = router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/player?id=hero1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["id"], "hero1");
        assert_eq!(json["factory"]["hpStation"]["cost"], 100);
        assert_eq!(json["progress"]["dungeonLevel"], 1);
    }

    #[tokio::test]
    async fn test_router_upgrade_errors_are_bad_request() {
        let app = router(test_state());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upgrade?playerID=p1&station=hp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_text(response).await,
            "Upgrade failed - insufficient funds or invalid station"
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upgrade?playerID=p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "PlayerID and station required");
    }

    #[tokio::test]
    async fn test_router_upgrade_rejects_get() {
        let app = router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/upgrade?playerID=p1&station=hp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
