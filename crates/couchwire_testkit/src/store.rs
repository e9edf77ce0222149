//! Databases and documents held by [`MemoryCouch`](crate::MemoryCouch).
//!
//! Every operation returns a [`Reply`] shaped like the one CouchDB sends,
//! including status codes, `{error, reason}` bodies and `ETag` revisions.

use couchwire_protocol::{USERS_DATABASE, USER_ID_PREFIX};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A view map function: takes a stored document (with `_id` and `_rev`)
/// and returns the emitted `(key, value)` pairs.
pub type MapFn = Arc<dyn Fn(&Value) -> Vec<(Value, Value)> + Send + Sync>;

/// Databases every server starts with.
pub const SYSTEM_DATABASES: [&str; 2] = [USERS_DATABASE, "_replicator"];

/// A reply from the emulated server.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
    /// Revision for the `ETag` header.
    pub etag: Option<String>,
}

impl Reply {
    pub(crate) fn ok(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            etag: None,
        }
    }

    pub(crate) fn error(status: u16, error: &str, reason: &str) -> Self {
        Self::ok(status, json!({"error": error, "reason": reason}))
    }

    pub(crate) fn with_etag(mut self, rev: &str) -> Self {
        self.etag = Some(rev.to_string());
        self
    }

    pub(crate) fn bad_request(reason: &str) -> Self {
        Self::error(400, "bad_request", reason)
    }

    pub(crate) fn conflict() -> Self {
        Self::error(409, "conflict", "Document update conflict.")
    }

    pub(crate) fn missing_database() -> Self {
        Self::error(404, "not_found", "Database does not exist.")
    }

    fn missing_document(deleted: bool) -> Self {
        Self::error(404, "not_found", if deleted { "deleted" } else { "missing" })
    }
}

/// Query options for `_all_docs` and views.
#[derive(Debug, Clone)]
pub(crate) struct RowQuery {
    pub(crate) limit: Option<usize>,
    pub(crate) include_docs: bool,
    pub(crate) start_key: Option<Value>,
    pub(crate) end_key: Option<Value>,
}

impl RowQuery {
    pub(crate) fn parse(pairs: &[(String, String)]) -> Result<Self, Reply> {
        let mut query = RowQuery {
            limit: None,
            include_docs: false,
            start_key: None,
            end_key: None,
        };
        for (key, value) in pairs {
            match key.as_str() {
                "limit" => {
                    let limit = value
                        .parse()
                        .map_err(|_| Reply::bad_request("limit must be a positive integer"))?;
                    query.limit = Some(limit);
                }
                "include_docs" => query.include_docs = value == "true",
                "startkey" | "start_key" => query.start_key = Some(parse_key(value)?),
                "endkey" | "end_key" => query.end_key = Some(parse_key(value)?),
                _ => {}
            }
        }
        Ok(query)
    }

    fn in_range(&self, key: &Value) -> bool {
        let after_start = self
            .start_key
            .as_ref()
            .map_or(true, |start| collate(key, start) != Ordering::Less);
        let before_end = self
            .end_key
            .as_ref()
            .map_or(true, |end| collate(key, end) != Ordering::Greater);
        after_start && before_end
    }
}

fn parse_key(value: &str) -> Result<Value, Reply> {
    serde_json::from_str(value).map_err(|_| Reply::bad_request("invalid UTF-8 JSON"))
}

/// Orders JSON values the way view keys are ordered:
/// null, booleans, numbers, strings, arrays, objects.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y) {
                match collate(left, right) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                match lk.cmp(rk).then_with(|| collate(lv, rv)) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    rev: String,
    seq: u64,
    deleted: bool,
    body: Map<String, Value>,
}

impl Entry {
    fn document(&self, id: &str) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".into(), Value::String(id.to_string()));
        doc.insert("_rev".into(), Value::String(self.rev.clone()));
        if self.deleted {
            doc.insert("_deleted".into(), Value::Bool(true));
        }
        doc.extend(self.body.clone());
        Value::Object(doc)
    }
}

#[derive(Debug, Default)]
struct Db {
    update_seq: u64,
    docs: BTreeMap<String, Entry>,
}

/// In-memory server state.
#[derive(Debug)]
pub(crate) struct Store {
    databases: BTreeMap<String, Db>,
    admins: BTreeMap<String, String>,
    generated_ids: u64,
}

impl Store {
    pub(crate) fn new() -> Self {
        let databases = SYSTEM_DATABASES
            .iter()
            .map(|name| (name.to_string(), Db::default()))
            .collect();
        Self {
            databases,
            admins: BTreeMap::new(),
            generated_ids: 0,
        }
    }

    pub(crate) fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub(crate) fn has_database(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    pub(crate) fn update_seq(&self, name: &str) -> Option<u64> {
        self.databases.get(name).map(|db| db.update_seq)
    }

    // Databases

    pub(crate) fn create_database(&mut self, name: &str) -> Reply {
        if !valid_database_name(name) {
            return Reply::error(
                400,
                "illegal_database_name",
                &format!(
                    "Name: '{}'. Only lowercase characters (a-z), digits (0-9), and any of the \
                     characters _, $, (, ), +, -, and / are allowed. Must begin with a letter.",
                    name
                ),
            );
        }
        if self.databases.contains_key(name) {
            return Reply::error(
                412,
                "file_exists",
                "The database could not be created, the file already exists.",
            );
        }
        self.databases.insert(name.to_string(), Db::default());
        Reply::ok(201, json!({"ok": true}))
    }

    pub(crate) fn delete_database(&mut self, name: &str) -> Reply {
        match self.databases.remove(name) {
            Some(_) => Reply::ok(200, json!({"ok": true})),
            None => Reply::missing_database(),
        }
    }

    pub(crate) fn database_info(&self, name: &str) -> Reply {
        let Some(db) = self.databases.get(name) else {
            return Reply::missing_database();
        };
        let live = db.docs.values().filter(|e| !e.deleted).count();
        let deleted = db.docs.len() - live;
        let data_size: usize = db
            .docs
            .values()
            .map(|e| serde_json::to_vec(&e.body).map(|b| b.len()).unwrap_or(0))
            .sum();
        Reply::ok(
            200,
            json!({
                "db_name": name,
                "doc_count": live,
                "doc_del_count": deleted,
                "update_seq": db.update_seq,
                "purge_seq": 0,
                "compact_running": false,
                "disk_size": data_size + 4096,
                "data_size": data_size,
                "instance_start_time": "0",
                "disk_format_version": 8,
                "committed_update_seq": db.update_seq,
            }),
        )
    }

    // Documents

    pub(crate) fn get_document(&self, db: &str, id: &str) -> Reply {
        let Some(db) = self.databases.get(db) else {
            return Reply::missing_database();
        };
        match db.docs.get(id) {
            Some(entry) if !entry.deleted => {
                Reply::ok(200, entry.document(id)).with_etag(&entry.rev)
            }
            Some(_) => Reply::missing_document(true),
            None => Reply::missing_document(false),
        }
    }

    pub(crate) fn put_document(
        &mut self,
        db_name: &str,
        id: &str,
        body: Value,
        query_rev: Option<&str>,
    ) -> Reply {
        let Value::Object(mut body) = body else {
            return Reply::bad_request("Document must be a JSON object");
        };
        if let Some(rev) = query_rev {
            body.insert("_rev".into(), Value::String(rev.to_string()));
        }
        if db_name == USERS_DATABASE {
            if let Err(reply) = prepare_user(id, &mut body) {
                return reply;
            }
        }
        match self.write(db_name, id, body, true) {
            Ok(rev) => Reply::ok(201, json!({"ok": true, "id": id, "rev": rev})).with_etag(&rev),
            Err(reply) => reply,
        }
    }

    pub(crate) fn delete_document(&mut self, db_name: &str, id: &str, rev: Option<&str>) -> Reply {
        let Some(db) = self.databases.get(db_name) else {
            return Reply::missing_database();
        };
        match db.docs.get(id) {
            Some(entry) if !entry.deleted => {}
            Some(_) => return Reply::missing_document(true),
            None => return Reply::missing_document(false),
        }

        let mut body = Map::new();
        body.insert("_deleted".into(), Value::Bool(true));
        if let Some(rev) = rev {
            body.insert("_rev".into(), Value::String(rev.to_string()));
        }
        match self.write(db_name, id, body, true) {
            Ok(rev) => Reply::ok(200, json!({"ok": true, "id": id, "rev": rev})).with_etag(&rev),
            Err(reply) => reply,
        }
    }

    /// Writes one document. `_rev` and `_deleted` are taken from the body.
    fn write(
        &mut self,
        db_name: &str,
        id: &str,
        mut body: Map<String, Value>,
        new_edits: bool,
    ) -> Result<String, Reply> {
        let db = self
            .databases
            .get_mut(db_name)
            .ok_or_else(Reply::missing_database)?;

        body.remove("_id");
        let rev = match body.remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            Some(_) => return Err(Reply::bad_request("Invalid rev format")),
            None => None,
        };
        let deleted = matches!(body.remove("_deleted"), Some(Value::Bool(true)));
        if deleted {
            body.clear();
        }

        let rev = if new_edits {
            let current = db.docs.get(id);
            let accepted = match (current, rev.as_deref()) {
                (Some(entry), given) if !entry.deleted => given == Some(entry.rev.as_str()),
                (Some(entry), given) => given.map_or(true, |g| g == entry.rev),
                (None, given) => given.is_none(),
            };
            if !accepted {
                return Err(Reply::conflict());
            }
            if deleted && current.map_or(true, |entry| entry.deleted) {
                return Err(Reply::missing_document(current.is_some()));
            }
            next_rev(current.map(|e| e.rev.as_str()).unwrap_or(""), id, &body)
        } else {
            rev.ok_or_else(|| Reply::bad_request("new_edits=false requires _rev"))?
        };

        db.update_seq += 1;
        db.docs.insert(
            id.to_string(),
            Entry {
                rev: rev.clone(),
                seq: db.update_seq,
                deleted,
                body,
            },
        );
        Ok(rev)
    }

    pub(crate) fn bulk_docs(&mut self, db_name: &str, body: Value) -> Reply {
        if !self.databases.contains_key(db_name) {
            return Reply::missing_database();
        }
        let Some(docs) = body.get("docs").and_then(Value::as_array) else {
            return Reply::bad_request("POST body must include `docs` parameter.");
        };
        let new_edits = body
            .get("new_edits")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut results = Vec::with_capacity(docs.len());
        for doc in docs.clone() {
            let Value::Object(doc) = doc else {
                results.push(json!({"error": "bad_request", "reason": "Document must be a JSON object"}));
                continue;
            };
            let id = match doc.get("_id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => self.generate_id(),
            };
            match self.write(db_name, &id, doc, new_edits) {
                Ok(rev) => results.push(json!({"ok": true, "id": id, "rev": rev})),
                Err(reply) => {
                    let mut result = json!({"id": id});
                    if let (Value::Object(result), Value::Object(error)) = (&mut result, reply.body)
                    {
                        result.extend(error);
                    }
                    results.push(result);
                }
            }
        }
        Reply::ok(201, Value::Array(results))
    }

    fn generate_id(&mut self) -> String {
        self.generated_ids += 1;
        format!("{:032x}", self.generated_ids)
    }

    // Rows

    pub(crate) fn all_docs(&self, db_name: &str, query: &RowQuery) -> Reply {
        let Some(db) = self.databases.get(db_name) else {
            return Reply::missing_database();
        };
        let rows: Vec<(Value, String, Value, &Entry)> = db
            .docs
            .iter()
            .filter(|(_, entry)| !entry.deleted)
            .map(|(id, entry)| {
                (
                    Value::String(id.clone()),
                    id.clone(),
                    json!({"rev": entry.rev}),
                    entry,
                )
            })
            .collect();
        Reply::ok(200, render_rows(rows, query))
    }

    pub(crate) fn view(&self, db_name: &str, design: &str, map: &MapFn, query: &RowQuery) -> Reply {
        let Some(db) = self.databases.get(db_name) else {
            return Reply::missing_database();
        };
        match db.docs.get(&format!("_design/{}", design)) {
            Some(entry) if !entry.deleted => {}
            _ => return Reply::missing_document(false),
        }

        let mut rows = Vec::new();
        for (id, entry) in &db.docs {
            if entry.deleted || id.starts_with("_design/") {
                continue;
            }
            for (key, value) in map(&entry.document(id)) {
                rows.push((key, id.clone(), value, entry));
            }
        }
        rows.sort_by(|a, b| collate(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));
        Reply::ok(200, render_rows(rows, query))
    }

    // Changes

    /// Returns the change records after `since`, one per document, in
    /// sequence order. `None` if the database does not exist.
    pub(crate) fn changes_since(
        &self,
        db_name: &str,
        since: u64,
        include_docs: bool,
    ) -> Option<Vec<(u64, Value)>> {
        let db = self.databases.get(db_name)?;
        let mut changes: Vec<(u64, Value)> = db
            .docs
            .iter()
            .filter(|(_, entry)| entry.seq > since)
            .map(|(id, entry)| {
                let mut record = json!({
                    "seq": entry.seq,
                    "id": id,
                    "changes": [{"rev": entry.rev}],
                });
                if entry.deleted {
                    record["deleted"] = Value::Bool(true);
                }
                if include_docs {
                    record["doc"] = entry.document(id);
                }
                (entry.seq, record)
            })
            .collect();
        changes.sort_by_key(|(seq, _)| *seq);
        Some(changes)
    }

    // Admins

    pub(crate) fn admins(&self) -> Reply {
        Reply::ok(200, json!(self.admins))
    }

    pub(crate) fn get_admin(&self, name: &str) -> Reply {
        match self.admins.get(name) {
            Some(hash) => Reply::ok(200, Value::String(hash.clone())),
            None => Reply::error(404, "not_found", "unknown_config_value"),
        }
    }

    pub(crate) fn put_admin(&mut self, name: &str, body: Value) -> Reply {
        let Value::String(password) = body else {
            return Reply::bad_request("request body must be a JSON string");
        };
        let previous = self
            .admins
            .insert(name.to_string(), password_hash(name, &password))
            .unwrap_or_default();
        Reply::ok(200, Value::String(previous))
    }

    pub(crate) fn delete_admin(&mut self, name: &str) -> Reply {
        match self.admins.remove(name) {
            Some(previous) => Reply::ok(200, Value::String(previous)),
            None => Reply::error(404, "not_found", "unknown_config_value"),
        }
    }
}

fn valid_database_name(name: &str) -> bool {
    if SYSTEM_DATABASES.contains(&name) {
        return true;
    }
    let mut chars = name.chars();
    matches!(chars.next(), Some('a'..='z'))
        && chars.all(|c| {
            matches!(c, 'a'..='z' | '0'..='9' | '_' | '$' | '(' | ')' | '+' | '-' | '/')
        })
}

fn next_rev(previous: &str, id: &str, body: &Map<String, Value>) -> String {
    let generation = previous
        .split('-')
        .next()
        .and_then(|g| g.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    previous.hash(&mut hasher);
    serde_json::to_string(body)
        .unwrap_or_default()
        .hash(&mut hasher);
    let low = hasher.finish();
    generation.hash(&mut hasher);
    format!("{}-{:016x}{:016x}", generation, hasher.finish(), low)
}

fn password_hash(name: &str, password: &str) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    password.hash(&mut hasher);
    format!("-pbkdf2-{:016x},{:016x},10", hasher.finish(), name.len())
}

/// Validates a `_users` document and replaces its password with a hash.
fn prepare_user(id: &str, body: &mut Map<String, Value>) -> Result<(), Reply> {
    if id.starts_with("_design/") || body.get("_deleted") == Some(&Value::Bool(true)) {
        return Ok(());
    }
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Reply::error(403, "forbidden", "doc.name is required"))?;
    if id != format!("{}{}", USER_ID_PREFIX, name) {
        return Err(Reply::error(
            403,
            "forbidden",
            "Doc ID must be of the form org.couchdb.user:name",
        ));
    }
    if body.get("type").and_then(Value::as_str) != Some("user") {
        return Err(Reply::error(403, "forbidden", "doc.type must be user"));
    }
    if let Some(Value::String(password)) = body.remove("password") {
        body.insert("password_scheme".into(), json!("pbkdf2"));
        body.insert("iterations".into(), json!(10));
        body.insert("derived_key".into(), json!(password_hash(&name, &password)));
    }
    Ok(())
}

fn render_rows(rows: Vec<(Value, String, Value, &Entry)>, query: &RowQuery) -> Value {
    let total_rows = rows.len();
    let mut offset = None;
    let mut rendered = Vec::new();
    for (index, (key, id, value, entry)) in rows.into_iter().enumerate() {
        if !query.in_range(&key) {
            continue;
        }
        if query.limit.is_some_and(|limit| rendered.len() >= limit) {
            break;
        }
        offset.get_or_insert(index);
        let mut row = json!({"id": id, "key": key, "value": value});
        if query.include_docs {
            row["doc"] = entry.document(&id);
        }
        rendered.push(row);
    }
    json!({
        "total_rows": total_rows,
        "offset": offset.unwrap_or(total_rows),
        "rows": rendered,
    })
}
