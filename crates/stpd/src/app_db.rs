//! Application-database publication.
//!
//! The engine's [`StateSync`] calls are synchronous run-to-completion
//! steps; database IO is not. [`AppDbSync`] therefore turns every
//! publication into a queued [`DbOp`], and the dispatch loop flushes the
//! queue after each step, so observers see a consistent per-instance
//! snapshot and the engine never blocks on redis.

use std::collections::VecDeque;

#[cfg(test)]
use std::collections::HashMap;

use stp_core::{StateSync, StpIndex, VlanPortTableUpdate, VlanTableUpdate};
use stp_types::{PortState, VlanId};
use tracing::{debug, warn};

use crate::commands;
use crate::Result;

#[cfg(not(test))]
use crate::StpdError;

/// STP state tables in APPL_DB.
pub const STP_VLAN_TABLE: &str = "STP_VLAN_TABLE";
pub const STP_VLAN_PORT_TABLE: &str = "STP_VLAN_PORT_TABLE";
pub const STP_VLAN_INSTANCE_TABLE: &str = "STP_VLAN_INSTANCE_TABLE";
pub const STP_PORT_STATE_TABLE: &str = "STP_PORT_STATE_TABLE";
pub const STP_PORT_TABLE: &str = "STP_PORT_TABLE";
pub const STP_FASTAGEING_FLAG_TABLE: &str = "STP_FASTAGEING_FLAG_TABLE";
pub const APP_PORT_TABLE: &str = "PORT_TABLE";
pub const APP_LAG_TABLE: &str = "LAG_TABLE";

/// One queued publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbOp {
    HSet {
        table: &'static str,
        key: String,
        fields: Vec<(String, String)>,
    },
    DelKey {
        table: &'static str,
        key: String,
    },
    /// Kernel bridge membership change, executed through the shell.
    Shell(String),
}

fn vlan_key(vlan: u16) -> String {
    format!("{}{}", commands::VLAN_PREFIX, vlan)
}

fn yes_no(v: bool) -> String {
    if v { "yes" } else { "no" }.to_string()
}

/// Queueing [`StateSync`] backend.
#[derive(Debug, Default)]
pub struct AppDbSync {
    pending: VecDeque<DbOp>,
}

impl AppDbSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything queued since the last flush.
    pub fn drain(&mut self) -> Vec<DbOp> {
        self.pending.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn push(&mut self, op: DbOp) {
        self.pending.push_back(op);
    }
}

impl StateSync for AppDbSync {
    fn add_vlan_to_instance(&mut self, vlan: VlanId, instance: StpIndex) {
        self.push(DbOp::HSet {
            table: STP_VLAN_INSTANCE_TABLE,
            key: vlan_key(vlan.as_u16()),
            fields: vec![("stp_instance".to_string(), instance.to_string())],
        });
    }

    fn del_vlan_from_instance(&mut self, vlan: VlanId, _instance: StpIndex) {
        self.push(DbOp::DelKey {
            table: STP_VLAN_INSTANCE_TABLE,
            key: vlan_key(vlan.as_u16()),
        });
    }

    fn update_vlan_table(&mut self, record: VlanTableUpdate) {
        let mut fields: Vec<(String, String)> =
            vec![("stp_instance".to_string(), record.stp_instance.to_string())];

        let mut put = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                fields.push((name.to_string(), value));
            }
        };
        put("bridge_id", record.bridge_id);
        put("root_bridge_id", record.root_bridge_id);
        put("desig_bridge_id", record.desig_bridge_id);
        put("root_port", record.root_port);
        put("root_path_cost", record.root_path_cost.map(|v| v.to_string()));
        put("root_max_age", record.root_max_age.map(|v| v.to_string()));
        put(
            "root_hello_time",
            record.root_hello_time.map(|v| v.to_string()),
        );
        put(
            "root_forward_delay",
            record.root_forward_delay.map(|v| v.to_string()),
        );
        put("max_age", record.max_age.map(|v| v.to_string()));
        put("hello_time", record.hello_time.map(|v| v.to_string()));
        put("forward_delay", record.forward_delay.map(|v| v.to_string()));
        put("hold_time", record.hold_time.map(|v| v.to_string()));
        put(
            "topology_change_count",
            record.topology_change_count.map(|v| v.to_string()),
        );
        put(
            "last_topology_change",
            record.topology_change_time.map(|v| v.to_string()),
        );

        self.push(DbOp::HSet {
            table: STP_VLAN_TABLE,
            key: vlan_key(record.vlan_id),
            fields,
        });
    }

    fn del_vlan_table(&mut self, vlan: VlanId) {
        self.push(DbOp::DelKey {
            table: STP_VLAN_TABLE,
            key: vlan_key(vlan.as_u16()),
        });
    }

    fn update_vlan_port_table(&mut self, record: VlanPortTableUpdate) {
        let key = format!("{}:{}", vlan_key(record.vlan_id), record.if_name);
        let mut fields: Vec<(String, String)> = Vec::new();

        let mut put = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                fields.push((name.to_string(), value));
            }
        };
        put("port_id", record.port_id.map(|v| v.to_string()));
        put("priority", record.port_priority.map(|v| v.to_string()));
        put("path_cost", record.path_cost.map(|v| v.to_string()));
        put("port_state", record.port_state);
        put(
            "desig_cost",
            record.designated_cost.map(|v| v.to_string()),
        );
        put("desig_root", record.designated_root);
        put("desig_bridge", record.designated_bridge);
        put("desig_port", record.designated_port.map(|v| v.to_string()));
        put(
            "fwd_transitions",
            record.forward_transitions.map(|v| v.to_string()),
        );
        put("bpdu_sent", record.tx_config_bpdu.map(|v| v.to_string()));
        put("bpdu_received", record.rx_config_bpdu.map(|v| v.to_string()));
        put("tc_sent", record.tx_tcn_bpdu.map(|v| v.to_string()));
        put("tc_received", record.rx_tcn_bpdu.map(|v| v.to_string()));
        put(
            "root_guard_timer",
            record.root_protect_timer.map(|v| v.to_string()),
        );
        if record.clear_stats {
            fields.push(("clear_stats".to_string(), "1".to_string()));
        }

        if !fields.is_empty() {
            self.push(DbOp::HSet {
                table: STP_VLAN_PORT_TABLE,
                key,
                fields,
            });
        }
    }

    fn del_vlan_port_table(&mut self, if_name: &str, vlan: VlanId) {
        self.push(DbOp::DelKey {
            table: STP_VLAN_PORT_TABLE,
            key: format!("{}:{}", vlan_key(vlan.as_u16()), if_name),
        });
    }

    fn update_port_state(&mut self, if_name: &str, instance: StpIndex, state: PortState) {
        self.push(DbOp::HSet {
            table: STP_PORT_STATE_TABLE,
            key: format!("{if_name}:{instance}"),
            fields: vec![("state".to_string(), state.as_str().to_string())],
        });
    }

    fn del_port_state(&mut self, if_name: &str, instance: StpIndex) {
        self.push(DbOp::DelKey {
            table: STP_PORT_STATE_TABLE,
            key: format!("{if_name}:{instance}"),
        });
    }

    fn update_kernel_port_state(
        &mut self,
        if_name: &str,
        vlan: VlanId,
        tagged: bool,
        forward: bool,
    ) {
        let cmd = if forward {
            commands::build_kernel_forward_cmd(vlan.as_u16(), if_name, tagged)
        } else {
            commands::build_kernel_block_cmd(vlan.as_u16(), if_name, tagged)
        };
        self.push(DbOp::Shell(cmd));
    }

    fn update_fast_aging(&mut self, vlan: VlanId, enabled: bool) {
        self.push(DbOp::HSet {
            table: STP_FASTAGEING_FLAG_TABLE,
            key: vlan_key(vlan.as_u16()),
            fields: vec![("fastageing_flag".to_string(), yes_no(enabled))],
        });
    }

    fn update_port_admin_state(&mut self, if_name: &str, up: bool, physical: bool) {
        let table = if physical { APP_PORT_TABLE } else { APP_LAG_TABLE };
        self.push(DbOp::HSet {
            table,
            key: if_name.to_string(),
            fields: vec![(
                "admin_status".to_string(),
                if up { "up" } else { "down" }.to_string(),
            )],
        });
    }

    fn update_bpdu_guard_shutdown(&mut self, if_name: &str, shutdown: bool) {
        self.push(DbOp::HSet {
            table: STP_PORT_TABLE,
            key: if_name.to_string(),
            fields: vec![("bpdu_guard_shutdown".to_string(), yes_no(shutdown))],
        });
    }

    fn update_port_fast(&mut self, if_name: &str, enabled: bool) {
        self.push(DbOp::HSet {
            table: STP_PORT_TABLE,
            key: if_name.to_string(),
            fields: vec![("port_fast".to_string(), yes_no(enabled))],
        });
    }

    fn del_stp_port(&mut self, if_name: &str) {
        self.push(DbOp::DelKey {
            table: STP_PORT_TABLE,
            key: if_name.to_string(),
        });
    }
}

/// APPL_DB access. Real redis in production, an in-memory map in tests.
#[derive(Clone)]
pub struct RedisAdapter {
    host: String,
    port: u16,
    db_number: u32,

    #[cfg(test)]
    data: std::sync::Arc<tokio::sync::Mutex<HashMap<String, HashMap<String, String>>>>,

    #[cfg(not(test))]
    connection: std::sync::Arc<tokio::sync::Mutex<Option<redis::aio::ConnectionManager>>>,
}

impl std::fmt::Debug for RedisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdapter")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_number", &self.db_number)
            .finish()
    }
}

impl RedisAdapter {
    pub fn new(host: impl Into<String>, port: u16, db_number: u32) -> Self {
        RedisAdapter {
            host: host.into(),
            port,
            db_number,
            #[cfg(test)]
            data: Default::default(),
            #[cfg(not(test))]
            connection: Default::default(),
        }
    }

    /// APPL_DB is database 0.
    pub fn app_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, 0)
    }

    #[cfg(not(test))]
    pub async fn connect(&mut self) -> Result<()> {
        let url = format!("redis://{}:{}/{}", self.host, self.port, self.db_number);
        let client = redis::Client::open(url.as_str()).map_err(|e| StpdError::Database {
            operation: "open".to_string(),
            message: e.to_string(),
        })?;
        let manager =
            redis::aio::ConnectionManager::new(client)
                .await
                .map_err(|e| StpdError::Database {
                    operation: "connect".to_string(),
                    message: e.to_string(),
                })?;
        *self.connection.lock().await = Some(manager);
        Ok(())
    }

    #[cfg(test)]
    pub async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        #[cfg(test)]
        {
            let mut data = self.data.lock().await;
            let entry = data.entry(key.to_string()).or_default();
            for (field, value) in fields {
                entry.insert(field.clone(), value.clone());
            }
            Ok(())
        }

        #[cfg(not(test))]
        {
            let mut guard = self.connection.lock().await;
            let Some(conn) = guard.as_mut() else {
                return Err(StpdError::Database {
                    operation: "hset".to_string(),
                    message: "not connected".to_string(),
                });
            };
            let pairs: Vec<(&str, &str)> = fields
                .iter()
                .map(|(f, v)| (f.as_str(), v.as_str()))
                .collect();
            redis::AsyncCommands::hset_multiple(conn, key, &pairs)
                .await
                .map_err(|e| StpdError::Database {
                    operation: "hset".to_string(),
                    message: e.to_string(),
                })
        }
    }

    async fn del(&self, key: &str) -> Result<()> {
        #[cfg(test)]
        {
            self.data.lock().await.remove(key);
            Ok(())
        }

        #[cfg(not(test))]
        {
            let mut guard = self.connection.lock().await;
            let Some(conn) = guard.as_mut() else {
                return Err(StpdError::Database {
                    operation: "del".to_string(),
                    message: "not connected".to_string(),
                });
            };
            redis::AsyncCommands::del(conn, key)
                .await
                .map_err(|e| StpdError::Database {
                    operation: "del".to_string(),
                    message: e.to_string(),
                })
        }
    }

    /// Reads one table entry (tests and debug dumps).
    #[cfg(test)]
    pub async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        self.data.lock().await.get(key).cloned().unwrap_or_default()
    }

    /// Applies a batch of queued publications. Shell operations run here
    /// too so kernel state tracks the same ordering.
    pub async fn apply(&self, ops: Vec<DbOp>) {
        for op in ops {
            let result = match &op {
                DbOp::HSet { table, key, fields } => {
                    self.hset(&format!("{table}:{key}"), fields).await
                }
                DbOp::DelKey { table, key } => self.del(&format!("{table}:{key}")).await,
                DbOp::Shell(cmd) => crate::shell::exec(cmd).await.map(|_| ()),
            };
            match result {
                Ok(()) => debug!(?op, "applied"),
                Err(err) => warn!(?op, %err, "publication failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vlan_table_update_carries_only_modified_fields() {
        let mut sync = AppDbSync::new();
        sync.update_vlan_table(VlanTableUpdate {
            vlan_id: 100,
            stp_instance: 0,
            root_bridge_id: Some("80640098192ce1c0".to_string()),
            root_path_cost: Some(20000),
            ..Default::default()
        });

        let ops = sync.drain();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            DbOp::HSet { table, key, fields } => {
                assert_eq!(*table, STP_VLAN_TABLE);
                assert_eq!(key, "Vlan100");
                assert!(fields
                    .iter()
                    .any(|(f, v)| f == "root_bridge_id" && v == "80640098192ce1c0"));
                assert!(fields.iter().any(|(f, v)| f == "root_path_cost" && v == "20000"));
                assert!(!fields.iter().any(|(f, _)| f == "max_age"));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_kernel_state_becomes_shell_op() {
        let mut sync = AppDbSync::new();
        sync.update_kernel_port_state("Ethernet4", VlanId::new(100).unwrap(), false, true);
        let ops = sync.drain();
        assert_eq!(
            ops,
            vec![DbOp::Shell(
                "/sbin/bridge vlan add vid 100 dev \"Ethernet4\" untagged".to_string()
            )]
        );
    }

    #[test]
    fn test_port_state_key_shape() {
        let mut sync = AppDbSync::new();
        sync.update_port_state("Ethernet4", 3, PortState::Forwarding);
        match &sync.drain()[0] {
            DbOp::HSet { table, key, fields } => {
                assert_eq!(*table, STP_PORT_STATE_TABLE);
                assert_eq!(key, "Ethernet4:3");
                assert_eq!(fields, &vec![("state".to_string(), "FORWARDING".to_string())]);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_adapter_applies_hset_and_del() {
        let adapter = RedisAdapter::app_db("127.0.0.1", 6379);
        adapter
            .apply(vec![DbOp::HSet {
                table: STP_VLAN_TABLE,
                key: "Vlan10".to_string(),
                fields: vec![("max_age".to_string(), "20".to_string())],
            }])
            .await;

        let entry = adapter.hgetall("STP_VLAN_TABLE:Vlan10").await;
        assert_eq!(entry.get("max_age").map(String::as_str), Some("20"));

        adapter
            .apply(vec![DbOp::DelKey {
                table: STP_VLAN_TABLE,
                key: "Vlan10".to_string(),
            }])
            .await;
        assert!(adapter.hgetall("STP_VLAN_TABLE:Vlan10").await.is_empty());
    }
}
