/// Case names that did not complete during this invocation, in first-seen
/// order, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct FailureAggregator {
    names: Vec<String>,
}

const NAME_WIDTH: usize = 40;

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// One line per name, 1-indexed, names truncated or padded to a fixed
    /// column.
    pub fn render(&self) -> String {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                format!(
                    "{:>3}. {:<width$.width$}\n",
                    i + 1,
                    name,
                    width = NAME_WIDTH
                )
            })
            .collect()
    }
}
