/// Database row types, mapped directly from SQLite rows.
/// Distinct from the vigil-types API models to keep the store independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub role: String,
    pub points: i64,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub banned_by_username: Option<String>,
    pub banned_by_email: Option<String>,
    pub last_username_change: Option<String>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct NewsRow {
    pub id: String,
    pub title: String,
    pub country: String,
    pub threat_actor: String,
    pub case_date: String,
    pub description: String,
    pub ioc: String,
    pub mitre_attack: String,
    pub recommendation: Option<String>,
    pub author_id: String,
    pub author_username: String,
    pub created_at: String,
}

/// Article fields supplied on create/update. `recommendation` is the only
/// optional field.
pub struct ArticleFields<'a> {
    pub title: &'a str,
    pub country: &'a str,
    pub threat_actor: &'a str,
    pub case_date: &'a str,
    pub description: &'a str,
    pub ioc: &'a str,
    pub mitre_attack: &'a str,
    pub recommendation: Option<&'a str>,
}

#[derive(Debug)]
pub struct CommentRow {
    pub id: String,
    pub news_id: String,
    pub author_id: String,
    pub author_username: String,
    pub body: String,
    pub parent_id: Option<String>,
    pub created_at: String,
}

/// One row of a like table, batch-fetched for a page of articles or comments.
pub struct LikeRow {
    pub target_id: String,
    pub user_id: String,
}

pub struct NewsReportRow {
    pub id: String,
    pub news_id: String,
    pub reported_by: String,
    pub reason: String,
    pub reported_at: String,
}

pub struct CommentReportRow {
    pub id: String,
    pub comment_id: String,
    pub reported_by: String,
    pub reason: String,
    pub reported_at: String,
}

/// Username/email of a profile joined into a moderation read model.
/// `None` when the profile row has been deleted since.
pub struct ProfileRef {
    pub username: Option<String>,
    pub email: String,
}

pub struct NewsReportDetail {
    pub report: NewsReportRow,
    pub news: NewsRow,
    pub author: Option<ProfileRef>,
    pub reporter: Option<ProfileRef>,
}

pub struct CommentReportDetail {
    pub report: CommentReportRow,
    pub comment: CommentRow,
    pub author: Option<ProfileRef>,
    pub reporter: Option<ProfileRef>,
}
