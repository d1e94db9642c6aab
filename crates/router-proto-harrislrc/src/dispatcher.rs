//! Applies decoded messages to the shared [`StateStore`], mirroring the
//! reference driver's `replyHandler` switch.
//!
//! Frame-parse and semantic problems never propagate out of [`dispatch`]:
//! they are logged (`warn` for malformed content, `debug` for message types
//! this dialect doesn't recognize) and the message is otherwise dropped, so
//! one bad message from the device never tears down the session.

use std::sync::Arc;

use router_core::store::IdRef;
use router_core::{CrosspointSink, StateStore};
use tracing::{debug, warn};

use crate::codec::{ArgSig, Message, Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// A `DBCHANGE` notification arrived; the driver should re-issue the
    /// full snapshot query sequence.
    SnapshotRequested,
}

fn parse_numeric_id(value: &str) -> Option<u32> {
    value.parse::<i64>().ok().and_then(|n| u32::try_from(n).ok())
}

pub async fn dispatch(
    store: &StateStore,
    sink: &Arc<dyn CrosspointSink>,
    msg: &Message,
) -> DispatchOutcome {
    match msg.msg_type.as_str() {
        "DBCHANGE" => DispatchOutcome::SnapshotRequested,
        "CHANNELS" if msg.op == Op::QueryResponse => {
            apply_channels(store, msg).await;
            DispatchOutcome::Applied
        }
        "DEST" if msg.op == Op::QueryResponse => {
            apply_endpoint_report(store, msg, Endpoint::Destination).await;
            DispatchOutcome::Applied
        }
        "SRC" if msg.op == Op::QueryResponse => {
            apply_endpoint_report(store, msg, Endpoint::Source).await;
            DispatchOutcome::Applied
        }
        "XPOINT" if msg.op == Op::QueryResponse || msg.op == Op::ChangeNotify => {
            apply_xpoint(store, sink, msg).await;
            DispatchOutcome::Applied
        }
        "LOCK" if msg.op == Op::QueryResponse || msg.op == Op::ChangeNotify => {
            apply_lock(store, msg).await;
            DispatchOutcome::Applied
        }
        other => {
            debug!(msg_type = other, op = ?msg.op, "ignoring unrecognized message");
            DispatchOutcome::Applied
        }
    }
}

async fn apply_channels(store: &StateStore, msg: &Message) {
    let (Some(ids), Some(names)) = (msg.arg("I"), msg.arg("NAME")) else {
        warn!("CHANNELS reply missing I or NAME argument");
        return;
    };
    for (id_str, name) in ids.values.iter().zip(names.values.iter()) {
        let Some(id) = parse_numeric_id(id_str) else {
            warn!(id = id_str, "CHANNELS reply has a non-numeric level id");
            continue;
        };
        store.upsert_level(id, name.clone()).await;
    }
}

#[derive(Clone, Copy)]
enum Endpoint {
    Destination,
    Source,
}

/// `DEST`/`SRC` replies come in two shapes: a name report (`I` + `NAME`,
/// `I` parsed as a plain integer with no sigil dispatch) and a channel-list
/// report (`I` + `CHANNELS`, with both the destination/source id and every
/// channel value resolved through the argument's own sigil).
async fn apply_endpoint_report(store: &StateStore, msg: &Message, endpoint: Endpoint) {
    let Some(id_arg) = msg.arg("I") else {
        warn!(msg_type = %msg.msg_type, "reply missing I argument");
        return;
    };

    if let Some(names) = msg.arg("NAME") {
        for (id_str, name) in id_arg.values.iter().zip(names.values.iter()) {
            let Some(id) = parse_numeric_id(id_str) else {
                warn!(id = id_str, msg_type = %msg.msg_type, "name report has a non-numeric id");
                continue;
            };
            match endpoint {
                Endpoint::Destination => store.upsert_destination_name(id, name.clone()).await,
                Endpoint::Source => store.upsert_source_name(id, name.clone()).await,
            }
        }
        return;
    }

    let Some(channels) = msg.arg("CHANNELS") else {
        warn!(msg_type = %msg.msg_type, "reply has neither NAME nor CHANNELS argument");
        return;
    };
    let Some(value) = id_arg.values.first() else {
        warn!(msg_type = %msg.msg_type, "I argument has no value");
        return;
    };
    let id = match resolve_endpoint_id(store, endpoint, id_arg.sig, value).await {
        Some(id) => id,
        None => {
            warn!(id = value, msg_type = %msg.msg_type, "channel report names an unknown id");
            return;
        }
    };

    let mut level_ids = Vec::with_capacity(channels.values.len());
    for level_value in &channels.values {
        match resolve_level_id(store, channels.sig, level_value).await {
            Some(level_id) => level_ids.push(level_id),
            None => warn!(level = level_value, "channel report names an unknown level"),
        }
    }
    match endpoint {
        Endpoint::Destination => store.extend_destination_levels(id, level_ids).await,
        Endpoint::Source => store.extend_source_levels(id, level_ids).await,
    }
}

async fn resolve_endpoint_id(
    store: &StateStore,
    endpoint: Endpoint,
    sig: ArgSig,
    value: &str,
) -> Option<u32> {
    match (endpoint, sig) {
        (_, ArgSig::Num) => parse_numeric_id(value),
        (Endpoint::Destination, ArgSig::Str | ArgSig::Utf) => {
            store.resolve_destination_id(IdRef::Name(value)).await
        }
        (Endpoint::Source, ArgSig::Str | ArgSig::Utf) => {
            store.resolve_source_id(IdRef::Name(value)).await
        }
    }
}

async fn resolve_level_id(store: &StateStore, sig: ArgSig, value: &str) -> Option<u32> {
    match sig {
        ArgSig::Num => parse_numeric_id(value),
        ArgSig::Str | ArgSig::Utf => store.resolve_level_id(IdRef::Name(value)).await,
    }
}

/// Splits a `D`/`S` value on its optional `.<level>` suffix.
fn split_dot(raw: &str) -> Option<(&str, Option<&str>)> {
    match raw.split_once('.') {
        Some((id, level)) => Some((id, Some(level))),
        None if !raw.is_empty() => Some((raw, None)),
        None => None,
    }
}

async fn apply_xpoint(store: &StateStore, sink: &Arc<dyn CrosspointSink>, msg: &Message) {
    let (Some(d_arg), Some(s_arg)) = (msg.arg("D"), msg.arg("S")) else {
        warn!("XPOINT message missing D or S argument");
        return;
    };
    if d_arg.sig != ArgSig::Num {
        warn!(sig = ?d_arg.sig, "XPOINT D argument must be numeric");
        return;
    }

    for (d_raw, s_raw) in d_arg.values.iter().zip(s_arg.values.iter()) {
        if s_raw.is_empty() {
            continue;
        }
        let Some((d_id_str, d_level_str)) = split_dot(d_raw) else {
            warn!(d = d_raw, "XPOINT D value is empty");
            continue;
        };
        let Some(dest_id) = parse_numeric_id(d_id_str) else {
            warn!(d = d_raw, "XPOINT D value has a non-numeric id");
            continue;
        };

        match d_level_str {
            Some(d_level_str) => {
                // Breakaway: D names a single destination-level slot, so S
                // must too.
                let Some((s_id_str, Some(s_level_str))) = split_dot(s_raw) else {
                    warn!(
                        d = d_raw,
                        s = s_raw,
                        "breakaway XPOINT requires a dotted source-level value"
                    );
                    continue;
                };
                let (Some(dest_level), Some(src_id), Some(src_level)) = (
                    d_level_str.parse::<u32>().ok(),
                    parse_numeric_id(s_id_str),
                    s_level_str.parse::<u32>().ok(),
                ) else {
                    warn!(d = d_raw, s = s_raw, "XPOINT value has a non-numeric component");
                    continue;
                };
                let crosspoint = store.set_crosspoint(dest_id, dest_level, src_id, src_level).await;
                sink.deliver(crosspoint).await;
            }
            None => {
                // Follow mode: mirror the source across every level the
                // destination declares.
                let s_id_str = match s_raw.split_once('.') {
                    Some((id, _)) => id,
                    None => s_raw.as_str(),
                };
                let Some(src_id) = parse_numeric_id(s_id_str) else {
                    warn!(s = s_raw, "XPOINT follow-mode S value has a non-numeric id");
                    continue;
                };
                let Some(destination) = store.destination(dest_id).await else {
                    warn!(dest = dest_id, "XPOINT follow mode names an unknown destination");
                    continue;
                };
                for level in destination.levels {
                    let crosspoint = store.set_crosspoint(dest_id, level, src_id, level).await;
                    sink.deliver(crosspoint).await;
                }
            }
        }
    }
}

async fn apply_lock(store: &StateStore, msg: &Message) {
    let (Some(d_arg), Some(v_arg)) = (msg.arg("D"), msg.arg("V")) else {
        warn!("LOCK message missing D or V argument");
        return;
    };
    let Some(d_raw) = d_arg.values.first() else {
        warn!("LOCK D argument has no value");
        return;
    };
    let dest_id = match resolve_endpoint_id(store, Endpoint::Destination, d_arg.sig, d_raw).await {
        Some(id) => id,
        None => {
            warn!(d = d_raw, "LOCK message names an unknown destination");
            return;
        }
    };
    let Some(locked_str) = v_arg.values.first() else {
        warn!("LOCK V argument has no value");
        return;
    };
    // The device reports the *locked* state as the literal string "OFF";
    // anything else (observed: "ON") means unlocked.
    let locked = locked_str == "OFF";
    store.project_lock(dest_id, locked).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use router_core::Crosspoint;
    use tokio::sync::Mutex;

    use crate::codec::Argument;

    struct RecordingSink {
        received: Mutex<Vec<Crosspoint>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                received: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CrosspointSink for RecordingSink {
        async fn deliver(&self, crosspoint: Crosspoint) {
            self.received.lock().await.push(crosspoint);
        }
    }

    fn num_arg(name: &str, values: &[&str]) -> Argument {
        Argument {
            name: name.to_owned(),
            sig: ArgSig::Num,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn str_arg(name: &str, values: &[&str]) -> Argument {
        Argument {
            name: name.to_owned(),
            sig: ArgSig::Str,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn channels_reply_populates_the_level_table() {
        let store = StateStore::new();
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new(
            "CHANNELS",
            Op::QueryResponse,
            vec![num_arg("I", &["1", "2"]), str_arg("NAME", &["SDI", "AES"])],
        );
        dispatch(&store, &sink, &msg).await;
        let levels = store.levels().await;
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[1].name, "AES");
    }

    #[tokio::test]
    async fn dest_name_report_upserts_destination() {
        let store = StateStore::new();
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new(
            "DEST",
            Op::QueryResponse,
            vec![num_arg("I", &["10"]), str_arg("NAME", &["MON-A"])],
        );
        dispatch(&store, &sink, &msg).await;
        let dest = store.destination(10).await.unwrap();
        assert_eq!(dest.name, "MON-A");
    }

    #[tokio::test]
    async fn dest_channels_report_resolves_levels_by_name() {
        let store = StateStore::new();
        store.upsert_level(1, "SDI".to_owned()).await;
        store.upsert_destination_name(10, "MON-A".to_owned()).await;
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new(
            "DEST",
            Op::QueryResponse,
            vec![num_arg("I", &["10"]), str_arg("CHANNELS", &["SDI"])],
        );
        dispatch(&store, &sink, &msg).await;
        let dest = store.destination(10).await.unwrap();
        assert_eq!(dest.levels, vec![1]);
    }

    #[tokio::test]
    async fn breakaway_xpoint_sets_single_slot_and_notifies() {
        let store = StateStore::new();
        store.upsert_destination_name(10, "MON-A".to_owned()).await;
        store.extend_destination_levels(10, [1]).await;
        let sink = Arc::new(RecordingSink::new());
        let dyn_sink: Arc<dyn CrosspointSink> = sink.clone();
        let msg = Message::new(
            "XPOINT",
            Op::ChangeNotify,
            vec![num_arg("D", &["10.1"]), num_arg("S", &["20.1"])],
        );
        dispatch(&store, &dyn_sink, &msg).await;
        let crosspoint = store.crosspoint(10, 1).await.unwrap();
        assert_eq!(crosspoint.source, 20);
        assert_eq!(sink.received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn follow_mode_xpoint_applies_to_every_declared_level() {
        let store = StateStore::new();
        store.upsert_destination_name(10, "MON-A".to_owned()).await;
        store.extend_destination_levels(10, [1, 2]).await;
        let sink = Arc::new(RecordingSink::new());
        let dyn_sink: Arc<dyn CrosspointSink> = sink.clone();
        let msg = Message::new(
            "XPOINT",
            Op::ChangeNotify,
            vec![num_arg("D", &["10"]), num_arg("S", &["20"])],
        );
        dispatch(&store, &dyn_sink, &msg).await;
        assert_eq!(store.crosspoint(10, 1).await.unwrap().source, 20);
        assert_eq!(store.crosspoint(10, 2).await.unwrap().source, 20);
        assert_eq!(sink.received.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn breakaway_d_with_non_dotted_s_is_dropped() {
        let store = StateStore::new();
        store.upsert_destination_name(10, "MON-A".to_owned()).await;
        store.extend_destination_levels(10, [1]).await;
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new(
            "XPOINT",
            Op::ChangeNotify,
            vec![num_arg("D", &["10.1"]), num_arg("S", &["20"])],
        );
        dispatch(&store, &sink, &msg).await;
        assert!(store.crosspoint(10, 1).await.is_none());
    }

    #[tokio::test]
    async fn empty_source_value_is_a_silent_no_op() {
        let store = StateStore::new();
        store.upsert_destination_name(10, "MON-A".to_owned()).await;
        store.extend_destination_levels(10, [1]).await;
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new(
            "XPOINT",
            Op::ChangeNotify,
            vec![num_arg("D", &["10.1"]), num_arg("S", &[""])],
        );
        dispatch(&store, &sink, &msg).await;
        assert!(store.crosspoint(10, 1).await.is_none());
    }

    #[tokio::test]
    async fn lock_projects_onto_every_stored_crosspoint_without_notifying() {
        let store = StateStore::new();
        store.upsert_destination_name(10, "MON-A".to_owned()).await;
        store.extend_destination_levels(10, [1, 2]).await;
        store.set_crosspoint(10, 1, 20, 1).await;
        store.set_crosspoint(10, 2, 20, 2).await;
        let sink = Arc::new(RecordingSink::new());
        let dyn_sink: Arc<dyn CrosspointSink> = sink.clone();
        let msg = Message::new("LOCK", Op::ChangeNotify, vec![num_arg("D", &["10"]), str_arg("V", &["OFF"])]);
        dispatch(&store, &dyn_sink, &msg).await;
        let crosspoints = store.crosspoints().await;
        assert!(crosspoints.iter().all(|c| c.locked));
        assert!(sink.received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn lock_on_unlocks() {
        let store = StateStore::new();
        store.upsert_destination_name(10, "MON-A".to_owned()).await;
        store.extend_destination_levels(10, [1]).await;
        store.set_crosspoint(10, 1, 20, 1).await;
        store.project_lock(10, true).await;
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new("LOCK", Op::ChangeNotify, vec![num_arg("D", &["10"]), str_arg("V", &["ON"])]);
        dispatch(&store, &sink, &msg).await;
        assert!(!store.crosspoint(10, 1).await.unwrap().locked);
    }

    #[tokio::test]
    async fn dbchange_requests_a_snapshot_refresh() {
        let store = StateStore::new();
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new("DBCHANGE", Op::ChangeNotify, vec![]);
        let outcome = dispatch(&store, &sink, &msg).await;
        assert_eq!(outcome, DispatchOutcome::SnapshotRequested);
    }

    #[tokio::test]
    async fn unrecognized_message_type_is_ignored() {
        let store = StateStore::new();
        let sink: Arc<dyn CrosspointSink> = Arc::new(RecordingSink::new());
        let msg = Message::new("WHATEVER", Op::ChangeNotify, vec![]);
        let outcome = dispatch(&store, &sink, &msg).await;
        assert_eq!(outcome, DispatchOutcome::Applied);
    }
}
