use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, header};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::dao::{
    models::QuestionRecord,
    room_store::{QuestionCatalog, RoomStore},
    storage::StorageResult,
};
use crate::state::document::TeamKey;

use super::{
    config::SupabaseConfig,
    error::{SupabaseDaoError, SupabaseResult},
    models::{LOCK_PROCEDURE, LockResultRow, QUESTION_TABLE, ROOM_TABLE, RoomRow},
};

/// Remote store speaking PostgREST to a Supabase project, scoped to one room.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
    room: Arc<str>,
}

impl SupabaseClient {
    /// Build a client for the configured project and room.
    pub fn new(config: SupabaseConfig) -> SupabaseResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| SupabaseDaoError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            api_key: Arc::from(config.api_key),
            room: Arc::from(config.room),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, path);
        self.client
            .request(method, url)
            .header("apikey", self.api_key.as_ref())
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.api_key.as_ref()),
            )
    }

    async fn fetch_rows<T>(&self, path: &str, query: &[(&str, String)]) -> SupabaseResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(|source| SupabaseDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(SupabaseDaoError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|source| SupabaseDaoError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    async fn expect_success(
        response: Result<reqwest::Response, reqwest::Error>,
        path: &str,
    ) -> SupabaseResult<()> {
        let response = response.map_err(|source| SupabaseDaoError::RequestSend {
            path: path.to_string(),
            source,
        })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // PostgREST returns 404 for a delete matching zero rows on some
            // configurations; an empty catalog is not an error.
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(SupabaseDaoError::RequestStatus {
                path: path.to_string(),
                status,
            }),
        }
    }

    fn room_filter(&self) -> (&'static str, String) {
        ("room_code", format!("eq.{}", self.room))
    }
}

impl RoomStore for SupabaseClient {
    fn load_room(&self) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = [store.room_filter(), ("select", "state".to_string())];
            let rows: Vec<RoomRow> = store.fetch_rows(ROOM_TABLE, &query).await?;
            Ok(rows.into_iter().next().map(|row| row.state))
        })
    }

    fn upsert_room(&self, document: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let row = RoomRow {
                room_code: store.room.to_string(),
                state: document,
            };
            let response = store
                .request(Method::POST, ROOM_TABLE)
                .query(&[("on_conflict", "room_code")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&[row])
                .send()
                .await;
            Self::expect_success(response, ROOM_TABLE).await?;
            Ok(())
        })
    }

    fn try_lock_buzzer(
        &self,
        team: TeamKey,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        Box::pin(async move {
            let path = format!("rpc/{LOCK_PROCEDURE}");
            let response = store
                .request(Method::POST, &path)
                .json(&json!({
                    "p_room": store.room.as_ref(),
                    "p_team": team.to_string(),
                }))
                .send()
                .await
                .map_err(|source| SupabaseDaoError::RequestSend {
                    path: path.clone(),
                    source,
                })?;

            if !response.status().is_success() {
                return Err(SupabaseDaoError::RequestStatus {
                    path,
                    status: response.status(),
                }
                .into());
            }

            let rows: Vec<LockResultRow> =
                response
                    .json()
                    .await
                    .map_err(|source| SupabaseDaoError::DecodeResponse {
                        path,
                        source,
                    })?;
            Ok(rows.into_iter().next().map(|row| row.state))
        })
    }
}

impl QuestionCatalog for SupabaseClient {
    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let query = [store.room_filter(), ("order", "position.asc".to_string())];
            let rows: Vec<super::models::QuestionRow> =
                store.fetch_rows(QUESTION_TABLE, &query).await?;
            Ok(rows.into_iter().map(|row| row.into_record()).collect())
        })
    }

    fn replace_questions(
        &self,
        records: Vec<QuestionRecord>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            // Delete-all then insert-all; a failure between the two steps is
            // repaired by the caller's retry, never papered over here.
            let delete = store
                .request(Method::DELETE, QUESTION_TABLE)
                .query(&[store.room_filter()])
                .send()
                .await;
            Self::expect_success(delete, QUESTION_TABLE).await?;

            if records.is_empty() {
                return Ok(());
            }

            let rows = records
                .into_iter()
                .map(|record| super::models::QuestionRow::from_record(&store.room, record))
                .collect::<SupabaseResult<Vec<_>>>()?;

            let insert = store
                .request(Method::POST, QUESTION_TABLE)
                .header("Prefer", "return=minimal")
                .json(&rows)
                .send()
                .await;
            Self::expect_success(insert, QUESTION_TABLE).await?;
            Ok(())
        })
    }
}
