/// A captured passage, bound to the page it was selected on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub id: u64,
    pub text: String,
    pub page: usize,
}

/// Append-only excerpt list for one reader session.
///
/// Ids start at 1 and are never reused within the session.
#[derive(Debug)]
pub struct ExcerptLog {
    entries: Vec<Excerpt>,
    next_id: u64,
}

impl Default for ExcerptLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExcerptLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub fn push(&mut self, text: String, page: usize) -> &Excerpt {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Excerpt { id, text, page });
        &self.entries[self.entries.len() - 1]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Excerpt> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Excerpt> {
        self.entries.last()
    }

    /// Drop every excerpt and restart ids at 1
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_id = 1;
    }
}
