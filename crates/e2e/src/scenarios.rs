//! Built-in scenarios for the Task Manager Pro sample app

use crate::spec::{Scenario, Step, Suite};

/// Identifiers and classes the app exposes; changing them breaks the suite
pub mod dom {
    use crate::spec::Locator;

    pub const HEADING_TEXT: &str = "Task Manager Pro";
    pub const APP_PATH: &str = "/sample-webapp/";

    pub fn heading() -> Locator {
        Locator::css("h1")
    }

    pub fn task_list() -> Locator {
        Locator::test_id("task-list")
    }

    pub fn task(id: u32) -> Locator {
        Locator::test_id(format!("task-{}", id))
    }

    pub fn status_badge(id: u32) -> Locator {
        task(id).locator(".status-badge")
    }

    pub fn toggle(id: u32) -> Locator {
        Locator::test_id(format!("toggle-{}", id))
    }

    pub fn delete(id: u32) -> Locator {
        Locator::test_id(format!("delete-{}", id))
    }

    pub fn task_input() -> Locator {
        Locator::test_id("task-input")
    }

    pub fn add_button() -> Locator {
        Locator::test_id("add-task-btn")
    }

    pub fn task_cards() -> Locator {
        Locator::css(".task-card")
    }

    pub fn last_task_title() -> Locator {
        Locator::css(".task-title").last()
    }

    /// Counter `index` of the stats panel: 0 completed, 1 in progress, 2 pending
    pub fn stat_number(index: i64) -> Locator {
        Locator::test_id("stats")
            .locator(".stat-card")
            .nth(index)
            .locator(".stat-number")
    }
}

/// Extend a scenario with checks that the stats panel reads
/// (completed, in progress, pending)
fn expect_stats(scenario: Scenario, counts: [usize; 3]) -> Scenario {
    counts
        .iter()
        .zip(0i64..)
        .fold(scenario, |s, (count, index)| {
            s.expect_text(dom::stat_number(index), count.to_string())
        })
}

pub fn displays_initial_tasks() -> Scenario {
    let scenario = Scenario::new("should display the homepage with initial tasks")
        .expect_text(dom::heading(), dom::HEADING_TEXT)
        .expect_visible(dom::task_list());

    (1..=4)
        .fold(scenario, |s, id| s.expect_visible(dom::task(id)))
        .expect_count(dom::task_cards(), 4)
        .snapshot("Homepage - Initial State")
}

pub fn adds_task_with_button() -> Scenario {
    Scenario::new("should add a new task")
        .fill(dom::task_input(), "New E2E Test Task")
        .click(dom::add_button())
        .expect_count(dom::task_cards(), 5)
        .expect_text(dom::last_task_title(), "New E2E Test Task")
        .expect_value(dom::task_input(), "")
        .snapshot("Homepage - After Adding Task")
}

pub fn toggles_task_status() -> Scenario {
    Scenario::new("should toggle task status")
        .expect_text(dom::status_badge(3), "pending")
        .click(dom::toggle(3))
        .expect_text(dom::status_badge(3), "in-progress")
        .snapshot("Homepage - Task In Progress")
        .click(dom::toggle(3))
        .expect_text(dom::status_badge(3), "completed")
        .snapshot("Homepage - Task Completed")
}

pub fn deletes_task() -> Scenario {
    Scenario::new("should delete a task")
        .expect_count(dom::task_cards(), 4)
        .click(dom::delete(4))
        .expect_count(dom::task_cards(), 3)
        .expect_not_visible(dom::task(4))
        .snapshot("Homepage - After Deleting Task")
}

pub fn updates_statistics() -> Scenario {
    let scenario = expect_stats(Scenario::new("should update statistics correctly"), [1, 1, 2])
        .click(dom::toggle(3))
        .click(dom::toggle(3));

    expect_stats(scenario, [2, 1, 1])
        .expect_count(dom::task_cards(), 4)
        .snapshot("Homepage - Updated Statistics")
}

pub fn adds_task_with_enter() -> Scenario {
    Scenario::new("should handle keyboard input for adding tasks")
        .fill(dom::task_input(), "Task Added With Enter")
        .press(dom::task_input(), "Enter")
        .expect_count(dom::task_cards(), 5)
        .expect_text(dom::last_task_title(), "Task Added With Enter")
        .expect_value(dom::task_input(), "")
}

/// Completed is terminal under the toggle control
pub fn keeps_completed_task_completed() -> Scenario {
    let scenario = Scenario::new("should keep completed tasks completed")
        .click(dom::toggle(3))
        .click(dom::toggle(3))
        .expect_text(dom::status_badge(3), "completed")
        .click(dom::toggle(3))
        .expect_text(dom::status_badge(3), "completed");

    expect_stats(scenario, [2, 1, 1])
}

/// The full Task Manager Pro suite
pub fn task_manager_suite() -> Suite {
    Suite {
        name: "Task Manager Pro".to_string(),
        before_each: vec![Step::Navigate { path: dom::APP_PATH.to_string() }],
        scenarios: vec![
            displays_initial_tasks(),
            adds_task_with_button(),
            toggles_task_status(),
            deletes_task(),
            updates_statistics(),
            adds_task_with_enter(),
            keeps_completed_task_completed(),
        ],
    }
}

/// Every snapshot label a suite asks for, in order
pub fn snapshot_labels(suite: &Suite) -> Vec<&str> {
    suite
        .scenarios
        .iter()
        .flat_map(|s| s.steps.iter())
        .filter_map(|step| match step {
            Step::Snapshot { label } => Some(label.as_str()),
            _ => None,
        })
        .collect()
}
