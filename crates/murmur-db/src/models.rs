/// Database row types. These map directly to SQLite rows and are converted
/// into murmur-types models at the edge of this crate.
use murmur_types::models::{Account, AccountId, Status, StatusId, Visibility};

pub struct AccountRow {
    pub id: i64,
    pub username: String,
    pub domain: Option<String>,
    pub statuses_count: i64,
}

impl AccountRow {
    pub fn into_account(self) -> Account {
        Account {
            id: AccountId(self.id),
            username: self.username,
            domain: self.domain,
        }
    }
}

/// A status joined with its author.
pub struct StatusRow {
    pub id: i64,
    pub visibility: Visibility,
    pub local: bool,
    pub reblog_of_id: Option<i64>,
    pub account: AccountRow,
}

impl StatusRow {
    pub fn into_status(self, media_attachment_ids: Vec<i64>) -> Status {
        Status {
            id: StatusId(self.id),
            account: self.account.into_account(),
            visibility: self.visibility,
            local: self.local,
            reblog_of_id: self.reblog_of_id.map(StatusId),
            media_attachment_ids,
            mass_destruction: false,
        }
    }
}

/// Fields needed to insert a status.
pub struct NewStatus {
    pub account_id: AccountId,
    pub visibility: Visibility,
    pub local: bool,
    pub reblog_of_id: Option<StatusId>,
}
