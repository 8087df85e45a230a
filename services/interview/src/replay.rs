/// A user message appended to a replay log for the duration of one call.
///
/// Unless [`PendingTurn::commit`] runs, dropping the guard truncates the log
/// back to where it was, so an aborted or failed call leaves no trace.
pub(crate) struct PendingTurn<'a, M> {
    log: &'a mut Vec<M>,
    committed_len: usize,
    committed: bool,
}

impl<'a, M> PendingTurn<'a, M> {
    pub(crate) fn push(log: &'a mut Vec<M>, user: M) -> Self {
        let committed_len = log.len();
        log.push(user);
        Self {
            log,
            committed_len,
            committed: false,
        }
    }

    /// Everything to send, including the pending user message.
    pub(crate) fn messages(&self) -> &[M] {
        self.log
    }

    pub(crate) fn commit(mut self, reply: M) {
        self.log.push(reply);
        self.committed = true;
    }
}

impl<M> Drop for PendingTurn<'_, M> {
    fn drop(&mut self) {
        if !self.committed {
            self.log.truncate(self.committed_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_turn_is_rolled_back() {
        let mut log = vec!["system"];
        {
            let turn = PendingTurn::push(&mut log, "hello");
            assert_eq!(turn.messages(), ["system", "hello"]);
        }
        assert_eq!(log, ["system"]);
    }

    #[test]
    fn committed_turn_keeps_both_messages() {
        let mut log = vec!["system"];
        PendingTurn::push(&mut log, "hello").commit("hi");
        assert_eq!(log, ["system", "hello", "hi"]);
    }
}
