use super::kinds;
use crate::family::create_family;
use crate::path::TaskPath;
use crate::reference::{Dependencies, TaskReference, after};
use crate::task::{State, TaskHandle};
use static_assertions::assert_impl_all;

assert_impl_all!(TaskHandle: Send, Sync);

#[test]
fn value_tasks_are_born_done() {
    let (task, out) = kinds::done_task(42);
    assert!(task.is_done());
    assert!(task.is_orphan());
    assert!(!task.is_split());
    assert_eq!(out.take(), 42);
}

#[test]
fn computing_tasks_are_born_new() {
    let (task, _out) = kinds::simple_task(|| 1);
    assert!(task.is_new());
    assert!(!task.is_done());
    assert!(!task.is_splitable());
}

#[test]
fn splitable_tasks_remember_their_operator() {
    let (task, _out) = kinds::splitable_task(|| 1, || crate::ops::done(1));
    assert!(task.is_splitable());
}

#[test]
fn split_tasks_expose_their_children() {
    let (left, left_out) = kinds::done_task(1);
    let (right, right_out) = kinds::done_task(2);
    let (task, _out) =
        kinds::split_task((left, left_out), (right, right_out), |a: i32, b: i32| a + b, true);

    assert!(task.is_split());
    assert!(task.left().is_some());
    assert!(task.right().is_some());
}

#[test]
fn adoption_assigns_paths_to_the_whole_graph() {
    let (left, left_out) = kinds::simple_task(|| 1);
    let (right, right_out) = kinds::simple_task(|| 2);
    let (task, _out) =
        kinds::split_task((left, left_out), (right, right_out), |a: i32, b: i32| a + b, true);

    let family = create_family();
    task.adopt(&family, TaskPath::root());

    assert!(!task.is_orphan());
    assert_eq!(task.id().family(), family.id());
    assert_eq!(task.depth(), 0);

    let left = task.left().unwrap();
    let right = task.right().unwrap();
    assert_eq!(left.path(), TaskPath::root().left_child());
    assert_eq!(right.path(), TaskPath::root().right_child());
    assert_eq!(left.id().family(), family.id());
}

#[test]
fn adopting_a_done_task_marks_its_path_complete() {
    let (task, _out) = kinds::done_task(7);
    let family = create_family();

    let path = TaskPath::root().right_child();
    task.adopt(&family, path);

    assert!(family.is_complete(&path));
    // The whole subtree under it as well.
    assert!(family.is_complete(&path.left_child()));
}

#[test]
fn references_require_a_family() {
    let (task, _out) = kinds::done_task(1);
    let family = create_family();
    task.adopt(&family, TaskPath::root());

    let r = TaskReference::from_task(&task);
    assert!(r.is_done());
    assert!(r.left().is_done());
}

#[test]
#[should_panic(expected = "orphan")]
fn referencing_an_orphan_panics() {
    let (task, _out) = kinds::done_task(1);
    let _ = TaskReference::from_task(&task);
}

#[test]
fn already_done_dependencies_are_consumed_immediately() {
    let (dep, _dep_out) = kinds::done_task(1);
    let family = create_family();
    dep.adopt(&family, TaskPath::root());

    let (task, out) = kinds::simple_task(|| 5);
    let deps = after([TaskReference::from_task(&dep)]);
    task.add_dependencies(&deps);

    // Release: with its only real dependency already done, the task goes
    // straight through Ready and runs.
    task.start();
    task.wait();
    assert!(task.is_done());
    assert_eq!(out.take(), 5);
}

#[test]
fn empty_dependency_sets_change_nothing() {
    let (task, out) = kinds::simple_task(|| 5);
    task.add_dependencies(&Dependencies::none());
    task.add_dependencies(&after([]));
    assert_eq!(task.core().active_deps.load(std::sync::atomic::Ordering::Acquire), 1);

    task.start();
    task.wait();
    assert_eq!(out.take(), 5);
}

#[test]
#[should_panic(expected = "released twice")]
fn starting_twice_panics() {
    let (task, _out) = kinds::done_task(1);
    // Already Done; a start is a second release.
    task.start();
}

#[test]
fn state_observation_follows_the_substitute() {
    let (task, out) = kinds::splitable_task(
        || 7,
        || {
            crate::ops::combine(
                Dependencies::none(),
                crate::ops::done(40),
                crate::ops::done(2),
                |a, b| a + b,
                true,
            )
        },
    );

    let family = create_family();
    task.adopt(&family, TaskPath::root());

    // Shallow family members split eagerly on release; the substitute
    // (whose children are both done) then finishes the task.
    task.start();
    task.wait();

    assert!(task.is_done());
    assert!(task.is_substituted());
    assert!(!task.is_splitable());
    // The substitute link is cut after aggregation.
    assert!(!task.is_split());
    assert_eq!(out.take(), 42);
}

#[test]
fn substituted_value_equals_substitute_value() {
    let (task, out) = kinds::splitable_task(|| 0, || crate::ops::done(99));
    let family = create_family();
    task.adopt(&family, TaskPath::root());

    task.start();
    task.wait();
    assert_eq!(out.take(), 99);
    assert!(family.is_complete(&TaskPath::root()));
}

#[test]
fn lifecycle_states_advance_in_order() {
    let (task, out) = kinds::simple_task(|| "x");
    assert_eq!(task.state(), State::New);

    task.start();
    task.wait();
    assert_eq!(task.state(), State::Done);
    assert_eq!(out.take(), "x");
}
