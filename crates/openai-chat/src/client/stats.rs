/// Token usage accumulated over every streamed completion of one client.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    total_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
    completions: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_usage(&mut self, total: u32, input: u32, output: u32) {
        self.total_tokens += u64::from(total);
        self.input_tokens += u64::from(input);
        self.output_tokens += u64::from(output);
        self.completions += 1;
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_across_completions() {
        let mut stats = Stats::new();
        stats.update_usage(30, 20, 10);
        stats.update_usage(5, 3, 2);
        assert_eq!(stats.total_tokens(), 35);
        assert_eq!(stats.input_tokens(), 23);
        assert_eq!(stats.output_tokens(), 12);
        assert_eq!(stats.completions(), 2);
    }
}
