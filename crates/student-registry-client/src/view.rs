use std::cmp::Ordering;

use student_registry_core::{StudentId, StudentRecord};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ViewState {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EmptyReason {
    NoStudents,
    NoMatches,
}

/// What the listing page should render right now.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Listing<'a> {
    Loading,
    Failed(&'a str),
    Empty(EmptyReason),
    Rows(Vec<&'a StudentRecord>),
}

/// Records whose name contains `term`, ignoring case. An empty term keeps everything.
#[must_use]
pub fn filter_by_name<'a>(students: &'a [StudentRecord], term: &str) -> Vec<&'a StudentRecord> {
    let needle = term.to_lowercase();
    students.iter().filter(|student| student.name.to_lowercase().contains(&needle)).collect()
}

/// Stable sort on the lowercased name.
pub fn sort_by_name(students: &mut [&StudentRecord], order: SortOrder) {
    students.sort_by(|left, right| {
        let ordering = compare_names(left, right);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compare_names(left: &StudentRecord, right: &StudentRecord) -> Ordering {
    left.name.to_lowercase().cmp(&right.name.to_lowercase())
}

/// Local cache of the student list plus the page state derived from it.
///
/// Search and sort never touch the server. Mutations are applied from the
/// server's response so the cache mirrors what was actually stored.
#[derive(Debug, Clone)]
pub struct StudentListView {
    state: ViewState,
    students: Vec<StudentRecord>,
    search_term: String,
    sort_order: SortOrder,
    notification: Option<Notification>,
    highlighted: Option<StudentId>,
}

impl Default for StudentListView {
    fn default() -> Self {
        Self::new()
    }
}

impl StudentListView {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ViewState::Loading,
            students: Vec::new(),
            search_term: String::new(),
            sort_order: SortOrder::default(),
            notification: None,
            highlighted: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ViewState::Ready
    }

    pub fn begin_loading(&mut self) {
        self.state = ViewState::Loading;
    }

    /// Finish a load. A failure drops the cached rows and blocks the page.
    pub fn loaded(&mut self, result: Result<Vec<StudentRecord>, String>) {
        match result {
            Ok(students) => {
                self.students = students;
                self.state = ViewState::Ready;
            }
            Err(message) => {
                self.students.clear();
                self.highlighted = None;
                self.state = ViewState::Failed(message);
            }
        }
    }

    #[must_use]
    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.sort_order = order;
    }

    pub fn toggle_sort_order(&mut self) {
        self.sort_order = self.sort_order.toggled();
    }

    /// Cached rows in server order, regardless of search and sort.
    #[must_use]
    pub fn students(&self) -> &[StudentRecord] {
        &self.students
    }

    /// Search-filtered and sorted rows. Empty unless the view is ready.
    #[must_use]
    pub fn visible_students(&self) -> Vec<&StudentRecord> {
        if !self.is_ready() {
            return Vec::new();
        }
        let mut visible = filter_by_name(&self.students, &self.search_term);
        sort_by_name(&mut visible, self.sort_order);
        visible
    }

    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible_students().len()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.students.len()
    }

    #[must_use]
    pub fn listing(&self) -> Listing<'_> {
        match &self.state {
            ViewState::Loading => Listing::Loading,
            ViewState::Failed(message) => Listing::Failed(message),
            ViewState::Ready => {
                let visible = self.visible_students();
                if !visible.is_empty() {
                    Listing::Rows(visible)
                } else if self.students.is_empty() {
                    Listing::Empty(EmptyReason::NoStudents)
                } else {
                    Listing::Empty(EmptyReason::NoMatches)
                }
            }
        }
    }

    #[must_use]
    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    #[must_use]
    pub fn highlighted(&self) -> Option<StudentId> {
        self.highlighted
    }

    pub fn clear_highlight(&mut self) {
        self.highlighted = None;
    }

    pub fn apply_created(&mut self, student: StudentRecord) {
        self.notify(NotificationKind::Success, format!("Added student \"{}\"", student.name));
        self.highlighted = Some(student.id);
        self.students.push(student);
    }

    /// Replace the cached row with the server's copy; unknown ids are appended.
    pub fn apply_updated(&mut self, student: StudentRecord) {
        self.notify(NotificationKind::Success, format!("Updated student \"{}\"", student.name));
        self.highlighted = Some(student.id);
        match self.students.iter_mut().find(|cached| cached.id == student.id) {
            Some(cached) => *cached = student,
            None => self.students.push(student),
        }
    }

    pub fn apply_deleted(&mut self, student: &StudentRecord) {
        self.notify(NotificationKind::Success, format!("Deleted student \"{}\"", student.name));
        self.students.retain(|cached| cached.id != student.id);
        if self.highlighted == Some(student.id) {
            self.highlighted = None;
        }
    }

    /// Record a failed mutation. The cached list is left as it was.
    pub fn mutation_failed(&mut self, message: impl Into<String>) {
        self.notify(NotificationKind::Error, message.into());
    }

    fn notify(&mut self, kind: NotificationKind, message: String) {
        self.notification = Some(Notification { kind, message });
    }
}
