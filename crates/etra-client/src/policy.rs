/// How a mutation shows up in local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Local state changes as soon as the store accepts the request,
    /// without waiting for the change feed.
    Optimistic,
    /// Local state changes only with the record the store hands back, either
    /// as the request's response or through the change feed.
    ConfirmFirst,
}

/// Every mutation the engine can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SendText,
    SendVoice,
    SendFile,
    DeleteMessage,
    ClearMessages,
    CreateNote,
    ToggleNote,
    DeleteNote,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::SendText,
        Operation::SendVoice,
        Operation::SendFile,
        Operation::DeleteMessage,
        Operation::ClearMessages,
        Operation::CreateNote,
        Operation::ToggleNote,
        Operation::DeleteNote,
    ];

    pub const fn policy(self) -> Policy {
        match self {
            // Sends merge the confirmed row, so the local list only ever holds
            // server ids and the echo from the feed is a no-op.
            Operation::SendText | Operation::SendVoice | Operation::SendFile => Policy::ConfirmFirst,
            Operation::DeleteMessage | Operation::ClearMessages => Policy::Optimistic,
            // Notes are reloaded in full on every push.
            Operation::CreateNote | Operation::ToggleNote | Operation::DeleteNote => Policy::ConfirmFirst,
        }
    }

    /// Whether the operation touches local state before the feed confirms it.
    pub const fn is_optimistic(self) -> bool {
        matches!(self.policy(), Policy::Optimistic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_message_deletes_are_optimistic() {
        let optimistic: Vec<_> = Operation::ALL
            .into_iter()
            .filter(|op| op.is_optimistic())
            .collect();
        assert_eq!(optimistic, [Operation::DeleteMessage, Operation::ClearMessages]);
    }
}
