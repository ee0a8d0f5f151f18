use crate::error::{MakeQuerySnafu, RosterResult};
use snafu::ResultExt;
use sqlx::PgConnection;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SettingKey {
    CurrentEventTag,
    StudentRequestsEnabled,
    WhatsappMessageTemplate,
    EmailMessageSubject,
    EmailMessageBody,
}

const DEFAULT_MESSAGE: &str = "Salaam,\n\nA visit was made on your behalf today as part of our volunteer programme.\n\nWasalaam";

impl SettingKey {
    /// The texts students send to beneficiaries once a visit is done.
    pub const MESSAGE_TEMPLATES: [Self; 3] = [
        Self::WhatsappMessageTemplate,
        Self::EmailMessageSubject,
        Self::EmailMessageBody,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Self::CurrentEventTag => "current_event_tag",
            Self::StudentRequestsEnabled => "student_requests_enabled",
            Self::WhatsappMessageTemplate => "whatsapp_message_template",
            Self::EmailMessageSubject => "email_message_subject",
            Self::EmailMessageBody => "email_message_body",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::CurrentEventTag => "Current Event Tag",
            Self::StudentRequestsEnabled => "Student Requests",
            Self::WhatsappMessageTemplate => "WhatsApp Message",
            Self::EmailMessageSubject => "Email Subject",
            Self::EmailMessageBody => "Email Body",
        }
    }

    pub const fn default_value(self) -> &'static str {
        match self {
            Self::CurrentEventTag => "",
            Self::StudentRequestsEnabled => "true",
            Self::WhatsappMessageTemplate | Self::EmailMessageBody => DEFAULT_MESSAGE,
            Self::EmailMessageSubject => "Visit made on your behalf",
        }
    }
}

/// Runtime settings, stored as key-value rows.
pub struct Setting;

impl Setting {
    pub async fn get(key: SettingKey, conn: &mut PgConnection) -> RosterResult<String> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT value FROM public.settings WHERE key = $1")
                .bind(key.key())
                .fetch_optional(conn)
                .await
                .context(MakeQuerySnafu)?
                .unwrap_or_else(|| key.default_value().to_string()),
        )
    }

    pub async fn set(key: SettingKey, value: &str, conn: &mut PgConnection) -> RosterResult<()> {
        sqlx::query("INSERT INTO public.settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = excluded.value")
            .bind(key.key())
            .bind(value)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }

    pub async fn message_templates(conn: &mut PgConnection) -> RosterResult<Vec<(SettingKey, String)>> {
        let mut templates = Vec::with_capacity(SettingKey::MESSAGE_TEMPLATES.len());
        for key in SettingKey::MESSAGE_TEMPLATES {
            templates.push((key, Self::get(key, &mut *conn).await?));
        }
        Ok(templates)
    }

    pub async fn student_requests_enabled(conn: &mut PgConnection) -> RosterResult<bool> {
        Ok(parse_flag(&Self::get(SettingKey::StudentRequestsEnabled, conn).await?))
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct_and_requests_default_on() {
        let mut keys = vec![
            SettingKey::CurrentEventTag.key(),
            SettingKey::StudentRequestsEnabled.key(),
        ];
        keys.extend(SettingKey::MESSAGE_TEMPLATES.map(SettingKey::key));
        let count = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), count);

        assert!(parse_flag(SettingKey::StudentRequestsEnabled.default_value()));
        assert!(SettingKey::CurrentEventTag.default_value().is_empty());
    }

    #[test]
    fn message_templates_are_never_blank_by_default() {
        for key in SettingKey::MESSAGE_TEMPLATES {
            assert!(!key.default_value().trim().is_empty(), "{}", key.key());
        }
    }

    #[test]
    fn flags_accept_form_values() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" ON "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
