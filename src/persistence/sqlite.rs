//! SQLite-backed record sink.
//!
//! One database per run. The whole run is written inside a single
//! transaction and committed on flush, so an aborted run leaves no
//! partially written period behind the last commit point.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::info;

use super::{
    AgentSnapshotRow, AspirationRow, DividendRow, RealizationRow, RecordSink, SecurityBalanceRow,
    TransactionRow,
};

/// A fresh run replaces any tables left over from a previous run under the
/// same file name.
const SCHEMA_SQL: &str = r#"
DROP TABLE IF EXISTS transactions;
CREATE TABLE transactions (
    period_num INT NOT NULL,
    iteration_num INT NOT NULL,
    state_num INT NOT NULL,
    transaction_num INT NOT NULL,
    buyer_id INT NOT NULL,
    seller_id INT NOT NULL,
    price REAL NOT NULL,
    action INT NOT NULL,
    bid REAL NOT NULL,
    buyer_aspiration REAL NOT NULL,
    ask REAL NOT NULL,
    seller_aspiration REAL NOT NULL,
    spread REAL NOT NULL
);

DROP TABLE IF EXISTS realizations;
CREATE TABLE realizations (
    period_num INT NOT NULL,
    state_num INT NOT NULL,
    realized INT NOT NULL
);

DROP TABLE IF EXISTS agents;
CREATE TABLE agents (
    period_num INT NOT NULL,
    agent_num INT NOT NULL,
    num_states INT NOT NULL,
    balance REAL NOT NULL,
    states TEXT NOT NULL,
    not_info TEXT NOT NULL,
    C INT NOT NULL
);

DROP TABLE IF EXISTS security_balances;
CREATE TABLE security_balances (
    period_num INT NOT NULL,
    agent_num INT NOT NULL,
    state_num INT NOT NULL,
    amount INT NOT NULL,
    dividend REAL NOT NULL,
    payout REAL NOT NULL,
    realized INT NOT NULL
);

DROP TABLE IF EXISTS aspirations;
CREATE TABLE aspirations (
    period_num INT NOT NULL,
    agent_num INT NOT NULL,
    state_num INT NOT NULL,
    C INT NOT NULL,
    start_aspiration REAL NOT NULL,
    not_info INT NOT NULL,
    backlog INT NOT NULL
);

DROP TABLE IF EXISTS dividends;
CREATE TABLE dividends (
    agent_num INT NOT NULL,
    trader_type INT NOT NULL,
    state_num INT NOT NULL,
    dividend REAL NOT NULL
);
"#;

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Create (or replace) the simulation tables at `path` and open the
    /// run-scoped write transaction.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize simulation schema")?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .context("failed to begin run transaction")?;
        info!("simulation database initialized at {}", path.display());
        Ok(Self { conn })
    }
}

impl RecordSink for SqliteSink {
    fn transaction(&mut self, row: &TransactionRow) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO transactions VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        stmt.execute(params![
            row.period as i64,
            row.iteration,
            row.state as i64,
            row.tx_index as i64,
            row.buyer as i64,
            row.seller as i64,
            row.price,
            row.bid_arrived_later as i64,
            row.bid,
            row.buyer_aspiration,
            row.ask,
            row.seller_aspiration,
            row.spread,
        ])?;
        Ok(())
    }

    fn realization(&mut self, row: &RealizationRow) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO realizations VALUES (?1, ?2, ?3)")?;
        stmt.execute(params![
            row.period as i64,
            row.state as i64,
            row.realized as i64
        ])?;
        Ok(())
    }

    fn agent_snapshot(&mut self, row: &AgentSnapshotRow) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO agents VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)")?;
        stmt.execute(params![
            row.period as i64,
            row.agent as i64,
            row.num_states as i64,
            row.balance,
            row.states_csv,
            row.not_info_csv,
            row.uncertain_count as i64,
        ])?;
        Ok(())
    }

    fn security_balance(&mut self, row: &SecurityBalanceRow) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO security_balances VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)")?;
        stmt.execute(params![
            row.period as i64,
            row.agent as i64,
            row.state as i64,
            row.amount,
            row.dividend,
            row.payout,
            row.realized as i64,
        ])?;
        Ok(())
    }

    fn aspiration(&mut self, row: &AspirationRow) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO aspirations VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)")?;
        stmt.execute(params![
            row.period as i64,
            row.agent as i64,
            row.state as i64,
            row.uncertain_count as i64,
            row.start_aspiration,
            row.from_not_info as i64,
            row.from_backlog as i64,
        ])?;
        Ok(())
    }

    fn dividend(&mut self, row: &DividendRow) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO dividends VALUES (?1, ?2, ?3, ?4)")?;
        stmt.execute(params![
            row.agent as i64,
            row.trader_type as i64,
            row.state as i64,
            row.dividend,
        ])?;
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT; BEGIN IMMEDIATE")
            .context("failed to checkpoint period")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("failed to commit run transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> TransactionRow {
        TransactionRow {
            period: 0,
            iteration: 3,
            state: 1,
            tx_index: 0,
            buyer: 0,
            seller: 1,
            price: 0.5,
            bid_arrived_later: true,
            bid: 0.6,
            buyer_aspiration: 0.6,
            ask: 0.4,
            seller_aspiration: 0.4,
            spread: 0.2,
        }
    }

    #[test]
    fn test_rows_round_trip_through_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.db");

        let mut sink = SqliteSink::create(&path).unwrap();
        sink.transaction(&sample_transaction()).unwrap();
        sink.realization(&RealizationRow {
            period: 0,
            state: 1,
            realized: true,
        })
        .unwrap();
        sink.dividend(&DividendRow {
            agent: 0,
            trader_type: 0,
            state: 1,
            dividend: 1.0,
        })
        .unwrap();
        sink.flush().unwrap();
        drop(sink);

        let conn = Connection::open(&path).unwrap();
        let (price, action): (f64, i64) = conn
            .query_row(
                "SELECT price, action FROM transactions WHERE state_num = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(price, 0.5);
        assert_eq!(action, 1);

        let realized: i64 = conn
            .query_row("SELECT realized FROM realizations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(realized, 1);
    }

    #[test]
    fn test_recreate_replaces_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.db");

        let mut sink = SqliteSink::create(&path).unwrap();
        sink.transaction(&sample_transaction()).unwrap();
        sink.flush().unwrap();
        drop(sink);

        // Opening the same file again starts from empty tables.
        let mut sink = SqliteSink::create(&path).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
