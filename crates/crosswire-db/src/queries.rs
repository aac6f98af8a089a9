use crate::Database;
use crate::models::{IdentityRow, IntegrationRow, ThreadLinkRow};
use anyhow::Result;
use crosswire_types::chat::Channel;
use rusqlite::Connection;

impl Database {
    // -- Thread links --

    /// Record that a thread is now shared to a chat channel/ts.
    ///
    /// `INSERT OR REPLACE` keeps the store invariant under redelivery or a
    /// repeated share: any existing row for the same thread id OR the same
    /// (channel, ts) pair is replaced, never duplicated. Last writer wins.
    pub fn insert_link(&self, thread_id: &str, chat_channel: &str, chat_ts: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO thread_links (thread_id, chat_channel, chat_ts) VALUES (?1, ?2, ?3)",
                (thread_id, chat_channel, chat_ts),
            )?;
            Ok(())
        })
    }

    pub fn link_for_thread(&self, thread_id: &str) -> Result<Option<ThreadLinkRow>> {
        self.with_conn(|conn| query_link_for_thread(conn, thread_id))
    }

    pub fn thread_for_chat_message(&self, chat_channel: &str, chat_ts: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT thread_id FROM thread_links WHERE chat_channel = ?1 AND chat_ts = ?2",
                (chat_channel, chat_ts),
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Identities --

    pub fn list_identities(&self) -> Result<Vec<IdentityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT threads_id, chat_id, display_name, email, avatar_url
                 FROM identities ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], map_identity_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn identity_by_threads_id(&self, threads_id: &str) -> Result<Option<IdentityRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT threads_id, chat_id, display_name, email, avatar_url
                 FROM identities WHERE threads_id = ?1",
                [threads_id],
                map_identity_row,
            )
            .optional()
        })
    }

    pub fn chat_id_for_threads_id(&self, threads_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT chat_id FROM identities WHERE threads_id = ?1",
                [threads_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
        })
    }

    pub fn threads_id_for_chat_id(&self, chat_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT threads_id FROM identities WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn link_identity(&self, threads_id: &str, chat_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE identities SET chat_id = ?2 WHERE threads_id = ?1",
                (threads_id, chat_id),
            )?;
            Ok(())
        })
    }

    /// Opportunistic linking: for every (chat_id, email) candidate, link the
    /// identity with that email if it is still unlinked and the chat id is
    /// not already claimed. Returns how many identities were linked.
    pub fn match_identities_by_email(&self, candidates: &[(String, String)]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut linked = 0;
            for (chat_id, email) in candidates {
                linked += tx.execute(
                    "UPDATE identities SET chat_id = ?1
                     WHERE email = ?2
                       AND chat_id IS NULL
                       AND NOT EXISTS (SELECT 1 FROM identities WHERE chat_id = ?1)",
                    (chat_id, email),
                )?;
            }
            tx.commit()?;
            Ok(linked)
        })
    }

    /// Register a shadow identity for a chat-only author. The chat id is
    /// reused as the threads id by convention, and the insert is a no-op if
    /// the mapping already exists.
    pub fn insert_shadow_identity(
        &self,
        chat_id: &str,
        display_name: &str,
        email: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO identities (threads_id, chat_id, display_name, email, avatar_url)
                 VALUES (?1, ?1, ?2, ?3, ?4)",
                (chat_id, display_name, email, avatar_url),
            )?;
            Ok(())
        })
    }

    // -- Integration credentials --

    pub fn save_integration(&self, bot_token: &str, bot_user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO integration (id, bot_token, bot_user_id) VALUES (1, ?1, ?2)",
                (bot_token, bot_user_id),
            )?;
            Ok(())
        })
    }

    pub fn load_integration(&self) -> Result<Option<IntegrationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT bot_token, bot_user_id FROM integration WHERE id = 1",
                [],
                |row| {
                    Ok(IntegrationRow {
                        bot_token: row.get(0)?,
                        bot_user_id: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn replace_channels(&self, channels: &[Channel]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chat_channels", [])?;
            for channel in channels {
                tx.execute(
                    "INSERT INTO chat_channels (id, name) VALUES (?1, ?2)",
                    (&channel.id, &channel.name),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM chat_channels ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Channel {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Tear down the integration: credentials, links, cached channels and all
    /// identity links go in one transaction.
    pub fn remove_integration(&self) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM thread_links", [])?;
            tx.execute("DELETE FROM integration", [])?;
            tx.execute("DELETE FROM chat_channels", [])?;
            tx.execute("UPDATE identities SET chat_id = NULL", [])?;
            tx.commit()?;
            Ok(())
        })
    }
}

fn query_link_for_thread(conn: &Connection, thread_id: &str) -> Result<Option<ThreadLinkRow>> {
    let mut stmt = conn.prepare(
        "SELECT thread_id, chat_channel, chat_ts FROM thread_links WHERE thread_id = ?1",
    )?;

    let row = stmt
        .query_row([thread_id], |row| {
            Ok(ThreadLinkRow {
                thread_id: row.get(0)?,
                chat_channel: row.get(1)?,
                chat_ts: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_identity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdentityRow> {
    Ok(IdentityRow {
        threads_id: row.get(0)?,
        chat_id: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        avatar_url: row.get(4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn link_lookup_works_in_both_directions() {
        let db = Database::open_in_memory().unwrap();
        db.insert_link("t1", "C100", "1700.100").unwrap();

        let link = db.link_for_thread("t1").unwrap().unwrap();
        assert_eq!(link.chat_channel, "C100");
        assert_eq!(link.chat_ts, "1700.100");

        let thread = db.thread_for_chat_message("C100", "1700.100").unwrap();
        assert_eq!(thread.as_deref(), Some("t1"));

        assert!(db.link_for_thread("t2").unwrap().is_none());
        assert!(db.thread_for_chat_message("C100", "1700.999").unwrap().is_none());
    }

    #[test]
    fn relinking_a_thread_overwrites_instead_of_duplicating() {
        let db = Database::open_in_memory().unwrap();
        db.insert_link("t1", "C100", "1700.100").unwrap();
        db.insert_link("t1", "C200", "1700.200").unwrap();

        let link = db.link_for_thread("t1").unwrap().unwrap();
        assert_eq!(link.chat_channel, "C200");

        // The old chat-side address must no longer resolve.
        assert!(db.thread_for_chat_message("C100", "1700.100").unwrap().is_none());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM thread_links", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn one_chat_address_cannot_point_at_two_threads() {
        let db = Database::open_in_memory().unwrap();
        db.insert_link("t1", "C100", "1700.100").unwrap();
        db.insert_link("t2", "C100", "1700.100").unwrap();

        assert_eq!(
            db.thread_for_chat_message("C100", "1700.100").unwrap().as_deref(),
            Some("t2")
        );
        assert!(db.link_for_thread("t1").unwrap().is_none());
    }

    #[test]
    fn concurrent_link_inserts_keep_invariants() {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let db = db.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let thread_id = format!("t{}", i % 5);
                        let ts = format!("1700.{:03}", (worker + i) % 7);
                        db.insert_link(&thread_id, "C1", &ts).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (threads, addresses, total): (i64, i64, i64) = db
            .with_conn(|conn| {
                Ok((
                    conn.query_row("SELECT COUNT(DISTINCT thread_id) FROM thread_links", [], |r| r.get(0))?,
                    conn.query_row(
                        "SELECT COUNT(DISTINCT chat_channel || '/' || chat_ts) FROM thread_links",
                        [],
                        |r| r.get(0),
                    )?,
                    conn.query_row("SELECT COUNT(*) FROM thread_links", [], |r| r.get(0))?,
                ))
            })
            .unwrap();

        // At most one row per thread id and per (channel, ts) pair.
        assert_eq!(threads, total);
        assert_eq!(addresses, total);
    }

    #[test]
    fn email_matching_links_only_unlinked_identities() {
        let db = Database::open_in_memory().unwrap();
        db.link_identity("maria", "UMARIA").unwrap();

        let candidates = vec![
            ("USAM".to_string(), "sam@example.com".to_string()),
            ("UOTHER".to_string(), "maria@example.com".to_string()),
            ("UNOBODY".to_string(), "nobody@example.com".to_string()),
        ];
        let linked = db.match_identities_by_email(&candidates).unwrap();
        assert_eq!(linked, 1);

        // maria keeps her explicit link
        assert_eq!(db.chat_id_for_threads_id("maria").unwrap().as_deref(), Some("UMARIA"));
        assert_eq!(db.chat_id_for_threads_id("sam").unwrap().as_deref(), Some("USAM"));
        assert_eq!(db.threads_id_for_chat_id("USAM").unwrap().as_deref(), Some("sam"));
    }

    #[test]
    fn email_matching_never_assigns_a_claimed_chat_id_twice() {
        let db = Database::open_in_memory().unwrap();
        db.link_identity("maria", "U1").unwrap();

        let candidates = vec![("U1".to_string(), "sam@example.com".to_string())];
        let linked = db.match_identities_by_email(&candidates).unwrap();
        assert_eq!(linked, 0);
        assert!(db.chat_id_for_threads_id("sam").unwrap().is_none());
    }

    #[test]
    fn shadow_identity_insert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.insert_shadow_identity("UGUEST", "Guest", "guest@chat.example.com", None).unwrap();
        db.insert_shadow_identity("UGUEST", "Guest again", "other@chat.example.com", None).unwrap();

        let row = db.identity_by_threads_id("UGUEST").unwrap().unwrap();
        assert_eq!(row.display_name, "Guest");
        assert_eq!(row.chat_id.as_deref(), Some("UGUEST"));
        assert_eq!(db.threads_id_for_chat_id("UGUEST").unwrap().as_deref(), Some("UGUEST"));
    }

    #[test]
    fn remove_integration_clears_everything_atomically() {
        let db = Database::open_in_memory().unwrap();
        db.save_integration("xoxb-token", "UBOT").unwrap();
        db.insert_link("t1", "C100", "1700.100").unwrap();
        db.replace_channels(&[Channel { id: "C100".into(), name: "general".into() }]).unwrap();
        db.link_identity("maria", "UMARIA").unwrap();

        db.remove_integration().unwrap();

        assert!(db.load_integration().unwrap().is_none());
        assert!(db.link_for_thread("t1").unwrap().is_none());
        assert!(db.list_channels().unwrap().is_empty());
        assert!(db.chat_id_for_threads_id("maria").unwrap().is_none());
    }
}
