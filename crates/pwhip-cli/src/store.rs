use anyhow::Result;
use pwhip::types::{MotionRecord, VoteRecord};
use rusqlite::{Connection, OptionalExtension, params};

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS motions (
              id TEXT NOT NULL,
              policy INTEGER NOT NULL,
              text TEXT NOT NULL,
              date TEXT NOT NULL,
              datetime TEXT,
              hansard TEXT NOT NULL,
              result TEXT NOT NULL,
              direction TEXT,
              PRIMARY KEY (id, policy)
            );

            CREATE INDEX IF NOT EXISTS idx_motions_policy ON motions(policy);

            -- option is part of the key so split votes keep both rows
            CREATE TABLE IF NOT EXISTS votes (
              motion TEXT NOT NULL,
              constituency TEXT NOT NULL,
              option TEXT NOT NULL,
              name TEXT NOT NULL,
              url TEXT NOT NULL,
              party TEXT NOT NULL,
              role TEXT,
              PRIMARY KEY (motion, constituency, option)
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn has_policy(&self, policy: u32) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM motions WHERE policy = ?1 LIMIT 1",
                params![policy],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Upserts every motion and vote of a policy in one transaction, so a
    /// failure leaves nothing of the policy behind.
    pub fn save_policy(&mut self, records: &[(MotionRecord, Vec<VoteRecord>)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (motion, votes) in records {
            upsert_motion(&tx, motion, votes)?;
        }
        tx.commit()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn motion_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM motions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub fn vote_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM votes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn upsert_motion(conn: &Connection, motion: &MotionRecord, votes: &[VoteRecord]) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO motions (id, policy, text, date, datetime, hansard, result, direction)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id, policy) DO UPDATE SET
          text=excluded.text,
          date=excluded.date,
          datetime=excluded.datetime,
          hansard=excluded.hansard,
          result=excluded.result,
          direction=excluded.direction
        "#,
        params![
            motion.id,
            motion.policy,
            motion.text,
            motion.date.to_string(),
            motion
                .datetime
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            motion.hansard,
            motion.result.as_str(),
            motion.direction,
        ],
    )?;

    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO votes (motion, constituency, option, name, url, party, role)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(motion, constituency, option) DO UPDATE SET
          name=excluded.name,
          url=excluded.url,
          party=excluded.party,
          role=excluded.role
        "#,
    )?;
    for vote in votes {
        stmt.execute(params![
            vote.motion,
            vote.constituency,
            vote.option,
            vote.name,
            vote.url,
            vote.party,
            vote.role.map(|r| r.as_str()),
        ])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pwhip::types::{DivisionResult, Role};

    fn motion(id: &str, policy: u32, text: &str) -> MotionRecord {
        MotionRecord {
            id: id.to_string(),
            policy,
            text: text.to_string(),
            date: NaiveDate::from_ymd_opt(2003, 11, 19).unwrap(),
            datetime: NaiveDate::from_ymd_opt(2003, 11, 20).and_then(|d| d.and_hms_opt(1, 30, 0)),
            hansard: "https://hansard.example/1".to_string(),
            result: DivisionResult::Passed,
            direction: Some("Majority".to_string()),
        }
    }

    fn vote(motion: &str, constituency: &str, option: &str) -> VoteRecord {
        VoteRecord {
            motion: motion.to_string(),
            name: format!("Member for {constituency}"),
            url: "https://www.publicwhip.org.uk/mp.php?id=1".to_string(),
            constituency: constituency.to_string(),
            party: "Lab".to_string(),
            option: option.to_string(),
            role: (option == "no").then_some(Role::Teller),
        }
    }

    #[test]
    fn test_save_and_lookup_policy() {
        let mut store = Store::open_in_memory().unwrap();
        assert!(!store.has_policy(363).unwrap());

        let m = motion("pw-2003-11-19-376", 363, "Criminal Justice Bill");
        let votes = vec![vote(&m.id, "Aytown", "yes"), vote(&m.id, "Beeton", "no")];
        store.save_policy(&[(m, votes)]).unwrap();

        assert!(store.has_policy(363).unwrap());
        assert!(!store.has_policy(364).unwrap());
        assert_eq!(store.motion_count().unwrap(), 1);
        assert_eq!(store.vote_count().unwrap(), 2);

        let (datetime, role): (Option<String>, Option<String>) = store
            .conn
            .query_row(
                "SELECT m.datetime, v.role FROM motions m JOIN votes v ON v.motion = m.id WHERE v.constituency = 'Beeton'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(datetime.as_deref(), Some("2003-11-20T01:30:00"));
        assert_eq!(role.as_deref(), Some("teller"));
    }

    #[test]
    fn test_save_is_an_upsert() {
        let mut store = Store::open_in_memory().unwrap();

        let m = motion("pw-2003-11-19-376", 363, "Old title");
        let votes = vec![vote(&m.id, "Aytown", "yes")];
        store.save_policy(&[(m, votes)]).unwrap();

        let m = motion("pw-2003-11-19-376", 363, "New title");
        let votes = vec![vote(&m.id, "Aytown", "yes")];
        store.save_policy(&[(m, votes)]).unwrap();

        assert_eq!(store.motion_count().unwrap(), 1);
        assert_eq!(store.vote_count().unwrap(), 1);

        let text: String = store
            .conn
            .query_row("SELECT text FROM motions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(text, "New title");
    }

    #[test]
    fn test_same_motion_under_two_policies() {
        let mut store = Store::open_in_memory().unwrap();

        store.save_policy(&[(motion("pw-1", 1, "Shared"), vec![])]).unwrap();
        store.save_policy(&[(motion("pw-1", 2, "Shared"), vec![])]).unwrap();

        assert_eq!(store.motion_count().unwrap(), 2);
    }

    #[test]
    fn test_split_vote_keeps_both_rows() {
        let mut store = Store::open_in_memory().unwrap();

        let m = motion("pw-2003-11-19-376", 363, "Criminal Justice Bill");
        let votes = vec![vote(&m.id, "Aytown", "both"), vote(&m.id, "Aytown", "yes")];
        store.save_policy(&[(m, votes)]).unwrap();

        assert_eq!(store.vote_count().unwrap(), 2);
    }

    #[test]
    fn test_failed_policy_save_stores_nothing() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(
                r#"
                CREATE TRIGGER reject_motion BEFORE INSERT ON motions
                WHEN NEW.id = 'pw-2003-11-20-380'
                BEGIN SELECT RAISE(ABORT, 'rejected'); END;
                "#,
            )
            .unwrap();

        let first = motion("pw-2003-11-19-376", 363, "Saved first");
        let first_votes = vec![vote(&first.id, "Aytown", "yes")];
        let second = motion("pw-2003-11-20-380", 363, "Rejected");

        assert!(
            store
                .save_policy(&[(first, first_votes), (second, vec![])])
                .is_err()
        );

        assert!(!store.has_policy(363).unwrap());
        assert_eq!(store.motion_count().unwrap(), 0);
        assert_eq!(store.vote_count().unwrap(), 0);
    }
}
