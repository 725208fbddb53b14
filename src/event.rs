//! Well-known gateway event types
//!
//! Listeners can be registered with any discriminator string; this enum
//! names the ones the gateway documents so callers don't have to spell them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

macro_rules! events {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Event type discriminators sent by the gateway
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Event {
            $($variant),+
        }

        impl Event {
            /// All known events, in declaration order
            pub const ALL: &'static [Event] = &[$(Event::$variant),+];

            /// The wire discriminator for this event
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Event::$variant => $name),+
                }
            }
        }

        impl FromStr for Event {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Event::$variant),)+
                    other => Err(Error::Internal(format!("Unknown event type: {}", other))),
                }
            }
        }
    };
}

events! {
    Hello => "hello",
    Message => "message",
    UserTyping => "user_typing",
    ChannelMarked => "channel_marked",
    ChannelCreated => "channel_created",
    ChannelJoined => "channel_joined",
    ChannelLeft => "channel_left",
    ChannelDeleted => "channel_deleted",
    ChannelRename => "channel_rename",
    ChannelArchive => "channel_archive",
    ChannelUnarchive => "channel_unarchive",
    ChannelHistoryChanged => "channel_history_changed",
    DndUpdated => "dnd_updated",
    DndUpdatedUser => "dnd_updated_user",
    ImCreated => "im_created",
    ImOpen => "im_open",
    ImClose => "im_close",
    ImMarked => "im_marked",
    ImHistoryChanged => "im_history_changed",
    GroupJoined => "group_joined",
    GroupLeft => "group_left",
    GroupOpen => "group_open",
    GroupClose => "group_close",
    GroupArchive => "group_archive",
    GroupUnarchive => "group_unarchive",
    GroupRename => "group_rename",
    GroupMarked => "group_marked",
    GroupHistoryChanged => "group_history_changed",
    FileCreated => "file_created",
    FileShared => "file_shared",
    FileUnshared => "file_unshared",
    FilePublic => "file_public",
    FilePrivate => "file_private",
    FileChange => "file_change",
    FileDeleted => "file_deleted",
    FileCommentAdded => "file_comment_added",
    FileCommentEdited => "file_comment_edited",
    FileCommentDeleted => "file_comment_deleted",
    PinAdded => "pin_added",
    PinRemoved => "pin_removed",
    PresenceChange => "presence_change",
    ManualPresenceChange => "manual_presence_change",
    PrefChange => "pref_change",
    UserChange => "user_change",
    TeamJoin => "team_join",
    StarAdded => "star_added",
    StarRemoved => "star_removed",
    ReactionAdded => "reaction_added",
    ReactionRemoved => "reaction_removed",
    EmojiChanged => "emoji_changed",
    CommandsChanged => "commands_changed",
    TeamPlanChange => "team_plan_change",
    TeamPrefChange => "team_pref_change",
    TeamRename => "team_rename",
    TeamDomainChange => "team_domain_change",
    EmailDomainChanged => "email_domain_changed",
    TeamProfileChange => "team_profile_change",
    TeamProfileDelete => "team_profile_delete",
    TeamProfileReorder => "team_profile_reorder",
    BotAdded => "bot_added",
    BotChanged => "bot_changed",
    AccountsChanged => "accounts_changed",
    TeamMigrationStarted => "team_migration_started",
    ReconnectUrl => "reconnect_url",
    SubteamCreated => "subteam_created",
    SubteamUpdated => "subteam_updated",
    SubteamSelfAdded => "subteam_self_added",
    SubteamSelfRemoved => "subteam_self_removed",
    Goodbye => "goodbye",
    Pong => "pong",
    Error => "error",
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Event> for String {
    fn from(event: Event) -> Self {
        event.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde() {
        for event in Event::ALL {
            let json = serde_json::to_string(event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }

    #[test]
    fn test_from_str_roundtrip_all() {
        for event in Event::ALL {
            assert_eq!(event.as_str().parse::<Event>().unwrap(), *event);
        }
    }

    #[test]
    fn test_from_str_unknown() {
        assert!("not_an_event".parse::<Event>().is_err());
        assert!("MESSAGE".parse::<Event>().is_err());
    }

    #[test]
    fn test_into_string() {
        let s: String = Event::UserTyping.into();
        assert_eq!(s, "user_typing");
        assert_eq!(Event::ReconnectUrl.to_string(), "reconnect_url");
    }
}
