//! Composition of every outbound chat message: share posts, threaded reply
//! mirrors, and direct notifications. Pure functions, no I/O.

use crosswire_types::chat::{Block, ChatPostMessage};
use crosswire_types::events::{NotifyReason, ThreadMessageAdded, UserToNotify};
use crosswire_types::threads::{Thread, ThreadMessage};

/// Wording for a notification, picked by reason precedence:
/// mention beats create-thread beats the default.
pub fn action_text(reasons: Option<&[NotifyReason]>) -> &'static str {
    let reasons = reasons.unwrap_or(&[]);
    if reasons.contains(&NotifyReason::Mention) {
        "mentioned you"
    } else if reasons.contains(&NotifyReason::CreateThread) {
        "created a new thread"
    } else {
        "replied"
    }
}

/// The root post that opens the mirrored thread on the chat side.
pub fn first_share_message(
    author_name: &str,
    message: &ThreadMessage,
    thread: &Thread,
    channel: &str,
) -> ChatPostMessage {
    let headline = format!(
        "{} left a message on {}",
        author_name,
        linked_name(message.url.as_deref(), &thread.name)
    );
    ChatPostMessage {
        channel: channel.to_string(),
        text: headline.clone(),
        thread_ts: None,
        blocks: vec![
            Block::section(headline),
            Block::section(blockquote(&message.plaintext)),
        ],
    }
}

/// A mirrored message posted as a threaded reply under the root post.
pub fn reply_share_message(
    author_name: &str,
    plaintext: &str,
    channel: &str,
    thread_ts: &str,
) -> ChatPostMessage {
    ChatPostMessage {
        channel: channel.to_string(),
        text: format!("{} replied", author_name),
        thread_ts: Some(thread_ts.to_string()),
        blocks: vec![
            Block::section(format!("{} replied:", author_name)),
            Block::section(blockquote(plaintext)),
        ],
    }
}

/// A direct, non-threaded notification to one recipient. The channel field
/// carries the recipient's chat user id, which the platform treats as a DM.
pub fn notification(
    chat_user_id: &str,
    event: &ThreadMessageAdded,
    recipient: &UserToNotify,
) -> ChatPostMessage {
    let action = action_text(recipient.reply_actions.as_deref());
    ChatPostMessage {
        channel: chat_user_id.to_string(),
        text: format!("{} {} on {}", event.author.name, action, event.thread.name),
        thread_ts: None,
        blocks: vec![
            Block::section(format!(
                "{} {} on {}",
                event.author.name,
                action,
                linked_name(event.url.as_deref(), &event.thread.name)
            )),
            Block::section(blockquote(&event.plaintext)),
        ],
    }
}

fn linked_name(url: Option<&str>, name: &str) -> String {
    match url {
        Some(url) => format!("<{}|{}>", url, name),
        None => name.to_string(),
    }
}

fn blockquote(text: &str) -> String {
    format!("> {}", text.replace('\n', "\n> "))
}
