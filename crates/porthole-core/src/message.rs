#![forbid(unsafe_code)]

//! Typed payloads for every registry channel.
//!
//! Ports carry plain JSON. [`FromAppMsg::decode`] turns a payload received on a
//! [`FromAppChannel`] into a typed message; [`ToAppMsg::encode`] does the
//! reverse for host → application traffic.
//!
//! # Wire shapes
//!
//! | Port | Payload |
//! |------|---------|
//! | `localStorageSetJsonItem` | `[key, value]` |
//! | `setCache` | any JSON, `null` clears |
//! | `signIn`, `signOut` | ignored |
//! | `changeTodoTitle` | `"todoId"` |
//! | `updateFirestoreDoc` | `{userDocPath, data}` |
//! | `deleteFirestoreDoc` | `{userDocPath}` |
//! | `addFirestoreDoc` | `{userCollectionName, data}` |
//! | `queryFirestore` | `{id, userCollectionName, whereClause: [[field, op, value]]}` |
//! | `disposeFirestoreQuery` | `"id"` |
//! | `getBoundingClientRects` | `{id, beacons: [[token, elementId]], anchors: [..]}` |
//! | `onAuthStateChanged` | user object or `null` |
//! | `onFirestoreQueryResponse` | `{id, docDataList}` |
//! | `gotBoundingClientRects` | `{id, beacons: [[token, rect]], anchors: [..]}` |

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::{FromAppChannel, ToAppChannel};
use crate::error::{Error, Result};
use crate::session::User;

/// Field map of a stored document.
pub type DocData = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Query filters
// ---------------------------------------------------------------------------

/// Comparison operator of a where clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "array-contains")]
    ArrayContains,
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not-in")]
    NotIn,
}

impl Operator {
    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::ArrayContains => "array-contains",
            Self::ArrayContainsAny => "array-contains-any",
            Self::In => "in",
            Self::NotIn => "not-in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(field, operator, value)` refinement. Serialized as a 3-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(String, Operator, Value)",
    into = "(String, Operator, Value)"
)]
pub struct WhereClause {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl WhereClause {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

impl From<(String, Operator, Value)> for WhereClause {
    fn from((field, op, value): (String, Operator, Value)) -> Self {
        Self { field, op, value }
    }
}

impl From<WhereClause> for (String, Operator, Value) {
    fn from(clause: WhereClause) -> Self {
        (clause.field, clause.op, clause.value)
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Bounding rectangle of a measured element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub offset_left: f64,
    pub offset_top: f64,
}

/// Size of the visible viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

// ---------------------------------------------------------------------------
// App → host payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocRequest {
    pub user_doc_path: String,
    pub data: DocData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDocRequest {
    pub user_doc_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDocRequest {
    pub user_collection_name: String,
    #[serde(default)]
    pub data: DocData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub id: String,
    pub user_collection_name: String,
    #[serde(default)]
    pub where_clause: Vec<WhereClause>,
}

/// Measurement request: two lists of `(correlation token, element id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureRequest {
    pub id: String,
    #[serde(default)]
    pub beacons: Vec<(Value, String)>,
    #[serde(default)]
    pub anchors: Vec<(Value, String)>,
}

/// A decoded application → host message.
#[derive(Debug, Clone, PartialEq)]
pub enum FromAppMsg {
    LocalStorageSetJsonItem { key: String, value: Value },
    SetCache(Value),
    SignIn,
    SignOut,
    ChangeTodoTitle { todo_id: String },
    UpdateDoc(UpdateDocRequest),
    DeleteDoc(DeleteDocRequest),
    AddDoc(AddDocRequest),
    Query(QueryRequest),
    DisposeQuery { id: String },
    Measure(MeasureRequest),
}

fn decode_as<T: DeserializeOwned>(channel: FromAppChannel, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|err| Error::MalformedMessage {
        channel: channel.name().to_owned(),
        reason: err.to_string(),
    })
}

impl FromAppMsg {
    /// Decode `payload` received on `channel`.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedMessage`] when the payload does not have the
    /// channel's shape.
    pub fn decode(channel: FromAppChannel, payload: Value) -> Result<Self> {
        Ok(match channel {
            FromAppChannel::LocalStorageSetJsonItem => {
                let (key, value) = decode_as::<(String, Value)>(channel, payload)?;
                Self::LocalStorageSetJsonItem { key, value }
            }
            FromAppChannel::SetCache => Self::SetCache(payload),
            FromAppChannel::SignIn => Self::SignIn,
            FromAppChannel::SignOut => Self::SignOut,
            FromAppChannel::ChangeTodoTitle => Self::ChangeTodoTitle {
                todo_id: decode_as(channel, payload)?,
            },
            FromAppChannel::UpdateFirestoreDoc => Self::UpdateDoc(decode_as(channel, payload)?),
            FromAppChannel::DeleteFirestoreDoc => Self::DeleteDoc(decode_as(channel, payload)?),
            FromAppChannel::AddFirestoreDoc => Self::AddDoc(decode_as(channel, payload)?),
            FromAppChannel::QueryFirestore => Self::Query(decode_as(channel, payload)?),
            FromAppChannel::DisposeFirestoreQuery => Self::DisposeQuery {
                id: decode_as(channel, payload)?,
            },
            FromAppChannel::GetBoundingClientRects => Self::Measure(decode_as(channel, payload)?),
        })
    }

    /// Channel this message belongs to.
    #[must_use]
    pub fn channel(&self) -> FromAppChannel {
        match self {
            Self::LocalStorageSetJsonItem { .. } => FromAppChannel::LocalStorageSetJsonItem,
            Self::SetCache(_) => FromAppChannel::SetCache,
            Self::SignIn => FromAppChannel::SignIn,
            Self::SignOut => FromAppChannel::SignOut,
            Self::ChangeTodoTitle { .. } => FromAppChannel::ChangeTodoTitle,
            Self::UpdateDoc(_) => FromAppChannel::UpdateFirestoreDoc,
            Self::DeleteDoc(_) => FromAppChannel::DeleteFirestoreDoc,
            Self::AddDoc(_) => FromAppChannel::AddFirestoreDoc,
            Self::Query(_) => FromAppChannel::QueryFirestore,
            Self::DisposeQuery { .. } => FromAppChannel::DisposeFirestoreQuery,
            Self::Measure(_) => FromAppChannel::GetBoundingClientRects,
        }
    }
}

// ---------------------------------------------------------------------------
// Host → app payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub id: String,
    pub doc_data_list: Vec<DocData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureResponse {
    pub id: String,
    pub beacons: Vec<(Value, Rect)>,
    pub anchors: Vec<(Value, Rect)>,
}

/// A host → application message.
#[derive(Debug, Clone, PartialEq)]
pub enum ToAppMsg {
    AuthStateChanged(Option<User>),
    QueryResponse(QueryResponse),
    Rects(MeasureResponse),
}

impl ToAppMsg {
    /// Channel this message is sent on.
    #[must_use]
    pub fn channel(&self) -> ToAppChannel {
        match self {
            Self::AuthStateChanged(_) => ToAppChannel::OnAuthStateChanged,
            Self::QueryResponse(_) => ToAppChannel::OnFirestoreQueryResponse,
            Self::Rects(_) => ToAppChannel::GotBoundingClientRects,
        }
    }

    /// Encode to the wire payload.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedMessage`] if a value cannot be represented as JSON.
    pub fn encode(&self) -> Result<Value> {
        let encoded = match self {
            Self::AuthStateChanged(user) => serde_json::to_value(user),
            Self::QueryResponse(response) => serde_json::to_value(response),
            Self::Rects(response) => serde_json::to_value(response),
        };
        encoded.map_err(|err| Error::MalformedMessage {
            channel: self.channel().name().to_owned(),
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decode_query_preserves_clause_order() {
        let msg = FromAppMsg::decode(
            FromAppChannel::QueryFirestore,
            json!({
                "id": "pending",
                "userCollectionName": "todos",
                "whereClause": [["isDone", "==", false], ["projectId", "in", ["a", "b"]]]
            }),
        )
        .unwrap();
        let FromAppMsg::Query(req) = msg else {
            panic!("expected query");
        };
        assert_eq!(req.id, "pending");
        assert_eq!(
            req.where_clause,
            vec![
                WhereClause::new("isDone", Operator::Eq, false),
                WhereClause::new("projectId", Operator::In, json!(["a", "b"])),
            ]
        );
    }

    #[test]
    fn decode_storage_pair() {
        let msg = FromAppMsg::decode(
            FromAppChannel::LocalStorageSetJsonItem,
            json!(["cachedTodoList", [1, 2]]),
        )
        .unwrap();
        assert_eq!(
            msg,
            FromAppMsg::LocalStorageSetJsonItem {
                key: "cachedTodoList".into(),
                value: json!([1, 2]),
            }
        );
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let err = FromAppMsg::decode(FromAppChannel::DeleteFirestoreDoc, json!({"path": "x"}))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedMessage { ref channel, .. } if channel == "deleteFirestoreDoc"
        ));
    }

    #[test]
    fn decode_rejects_unknown_operator() {
        let result = FromAppMsg::decode(
            FromAppChannel::QueryFirestore,
            json!({"id": "q", "userCollectionName": "todos", "whereClause": [["a", "~=", 1]]}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn signals_ignore_payload() {
        assert_eq!(
            FromAppMsg::decode(FromAppChannel::SignIn, json!({"anything": 1})).unwrap(),
            FromAppMsg::SignIn
        );
        assert_eq!(
            FromAppMsg::decode(FromAppChannel::SignOut, Value::Null).unwrap(),
            FromAppMsg::SignOut
        );
    }

    #[test]
    fn channel_matches_decode_source() {
        let msg = FromAppMsg::decode(FromAppChannel::DisposeFirestoreQuery, json!("q1")).unwrap();
        assert_eq!(msg.channel(), FromAppChannel::DisposeFirestoreQuery);
    }

    #[test]
    fn encode_query_response() {
        let mut doc = DocData::new();
        doc.insert("id".into(), json!("d1"));
        let msg = ToAppMsg::QueryResponse(QueryResponse {
            id: "q1".into(),
            doc_data_list: vec![doc],
        });
        assert_eq!(
            msg.encode().unwrap(),
            json!({"id": "q1", "docDataList": [{"id": "d1"}]})
        );
    }

    #[test]
    fn encode_rects() {
        let rect = Rect {
            x: 1.0,
            y: 2.0,
            width: 3.0,
            height: 4.0,
            offset_left: 5.0,
            offset_top: 6.0,
        };
        let msg = ToAppMsg::Rects(MeasureResponse {
            id: "m".into(),
            beacons: vec![(json!("t1"), rect)],
            anchors: vec![],
        });
        assert_eq!(
            msg.encode().unwrap(),
            json!({
                "id": "m",
                "beacons": [["t1", {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0, "offsetLeft": 5.0, "offsetTop": 6.0}]],
                "anchors": []
            })
        );
    }

    #[test]
    fn encode_signed_out() {
        assert_eq!(
            ToAppMsg::AuthStateChanged(None).encode().unwrap(),
            Value::Null
        );
    }
}
