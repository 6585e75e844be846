// Chat transcript persistence.
//
// Messages are append-only; a conversation is only ever cleared en
// masse (or cascaded away with its spreadsheet).

use chrono::Utc;
use rusqlite::params;

use gridagent_core::{ChatMessage, ChatRole, EngineError, SpreadsheetId, ToolCallRecord};

use crate::sql_err;
use crate::store::SheetStore;

impl SheetStore {
    /// Append one chat message to a spreadsheet's transcript.
    pub fn append_message(
        &self,
        spreadsheet_id: SpreadsheetId,
        message: &ChatMessage,
    ) -> Result<(), EngineError> {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&message.tool_calls)
                    .map_err(|e| EngineError::Io(e.to_string()))?,
            )
        };
        self.rw
            .execute(
                "INSERT INTO chat_messages \
                 (spreadsheet_id, role, content, context_range, tool_calls, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    spreadsheet_id.0,
                    role,
                    message.content,
                    message.context_range,
                    tool_calls,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// Load the transcript in insertion order.
    pub fn load_messages(
        &self,
        spreadsheet_id: SpreadsheetId,
    ) -> Result<Vec<ChatMessage>, EngineError> {
        let mut stmt = self
            .rw
            .prepare(
                "SELECT role, content, context_range, tool_calls FROM chat_messages \
                 WHERE spreadsheet_id = ?1 ORDER BY id",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![spreadsheet_id.0], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                let context_range: Option<String> = row.get(2)?;
                let tool_calls: Option<String> = row.get(3)?;
                Ok((role, content, context_range, tool_calls))
            })
            .map_err(sql_err)?;

        let mut out = Vec::new();
        for r in rows {
            let (role, content, context_range, tool_calls) = r.map_err(sql_err)?;
            let tool_calls: Vec<ToolCallRecord> = match tool_calls {
                Some(blob) => {
                    serde_json::from_str(&blob).map_err(|e| EngineError::Io(e.to_string()))?
                }
                None => Vec::new(),
            };
            out.push(ChatMessage {
                role: if role == "user" { ChatRole::User } else { ChatRole::Assistant },
                content,
                context_range,
                tool_calls,
            });
        }
        Ok(out)
    }

    /// Delete a spreadsheet's whole transcript.
    pub fn clear_conversation(&self, spreadsheet_id: SpreadsheetId) -> Result<usize, EngineError> {
        self.rw
            .execute(
                "DELETE FROM chat_messages WHERE spreadsheet_id = ?1",
                params![spreadsheet_id.0],
            )
            .map_err(sql_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridagent_core::{ToolCallKind, ToolCallStatus};

    #[test]
    fn transcript_round_trip() {
        let s = SheetStore::open_in_memory().unwrap();
        let ss = s.create_spreadsheet("Book").unwrap();

        s.append_message(ss, &ChatMessage::user("sum the revenue")).unwrap();
        let record = ToolCallRecord::ok("executeSheetSql", ToolCallKind::Read)
            .with_sheet("Sales")
            .with_summary("1 row");
        s.append_message(ss, &ChatMessage::assistant("Total is 240.", vec![record]))
            .unwrap();

        let msgs = s.load_messages(ss).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, ChatRole::User);
        assert_eq!(msgs[1].role, ChatRole::Assistant);
        assert_eq!(msgs[1].tool_calls.len(), 1);
        assert_eq!(msgs[1].tool_calls[0].status, ToolCallStatus::Ok);
    }

    #[test]
    fn clear_conversation_removes_everything() {
        let s = SheetStore::open_in_memory().unwrap();
        let ss = s.create_spreadsheet("Book").unwrap();
        s.append_message(ss, &ChatMessage::user("hi")).unwrap();
        s.append_message(ss, &ChatMessage::assistant("hello", vec![])).unwrap();

        assert_eq!(s.clear_conversation(ss).unwrap(), 2);
        assert!(s.load_messages(ss).unwrap().is_empty());
    }

    #[test]
    fn deleting_spreadsheet_cascades_to_transcript() {
        let s = SheetStore::open_in_memory().unwrap();
        let ss = s.create_spreadsheet("Book").unwrap();
        s.create_sheet(ss, "Data", &[]).unwrap();
        s.append_message(ss, &ChatMessage::user("hi")).unwrap();
        s.delete_spreadsheet(ss).unwrap();
        assert!(s.load_messages(ss).unwrap().is_empty());
    }
}
