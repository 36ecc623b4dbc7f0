use scheduler_core::config::Config;
use scheduler_core::coordinator::Coordinator;
use scheduler_core::task::{
    Assignment, CompletedTask, CompletionReport, Heartbeat, ScheduleReply, TaskOutputs, WorkerId,
    WorkerStatus,
};
use scheduler_core::task_executor::{map_output_locator, reduce_output_locator};
use scheduler_core::task_pool::JobPhase;
use std::collections::BTreeSet;
use std::time::Duration;

fn heartbeat(worker_id: Option<WorkerId>, status: WorkerStatus) -> Heartbeat {
    Heartbeat { worker_id, status }
}

fn idle(worker_id: WorkerId) -> Heartbeat {
    heartbeat(Some(worker_id), WorkerStatus::Idle)
}

fn first_contact(coordinator: &mut Coordinator) -> ScheduleReply {
    coordinator.schedule(heartbeat(None, WorkerStatus::Idle))
}

fn map_file(reply: &ScheduleReply) -> String {
    match &reply.assignment {
        Assignment::Map(task) => task.file.clone(),
        other => panic!("expected a map assignment, got {}", other),
    }
}

fn reduce_bucket(reply: &ScheduleReply) -> usize {
    match &reply.assignment {
        Assignment::Reduce(task) => task.bucket,
        other => panic!("expected a reduce assignment, got {}", other),
    }
}

/// Report a map of `file` that wrote one locator into every bucket
fn finish_map(coordinator: &mut Coordinator, worker_id: WorkerId, file: &str, reducers: usize) {
    let outputs: TaskOutputs = (0..reducers)
        .map(|k| (k, vec![map_output_locator(file, k)]))
        .collect();
    coordinator.report_completion(CompletionReport {
        worker_id,
        completed: CompletedTask::Map {
            file: file.to_string(),
            outputs,
        },
    });
}

fn finish_reduce(coordinator: &mut Coordinator, worker_id: WorkerId, bucket: usize) {
    coordinator.report_completion(CompletionReport {
        worker_id,
        completed: CompletedTask::Reduce {
            bucket,
            result: reduce_output_locator(bucket),
        },
    });
}

#[test]
fn test_zero_reducers_is_rejected() {
    assert!(Coordinator::new(["a"], 0).is_err());
}

#[test]
fn test_from_config_validates() {
    let config = Config {
        input_files: vec!["a".into(), "a".into()],
        ..Config::default()
    };
    assert!(Coordinator::from_config(&config).is_err());

    let coordinator = Coordinator::from_config(&Config::default()).unwrap();
    assert_eq!(coordinator.pool().pending_map_inputs().count(), 4);
    assert_eq!(coordinator.pool().reducer_count(), 3);
}

#[test]
fn test_first_heartbeat_registers_worker() {
    let mut coordinator = Coordinator::new(["a", "b"], 2).unwrap();

    let first = first_contact(&mut coordinator);
    let second = first_contact(&mut coordinator);

    assert_eq!(first.worker_id, WorkerId(1));
    assert_eq!(second.worker_id, WorkerId(2));
    assert_eq!(first.status, WorkerStatus::MapAssigned);
    assert_eq!(map_file(&first), "a");
    assert_eq!(map_file(&second), "b");

    let record = coordinator.worker(WorkerId(1)).unwrap();
    assert_eq!(record.status, WorkerStatus::MapAssigned);
    assert!(record.assigned_at.is_some());
}

#[test]
fn test_register_worker_ids_are_unique() {
    let mut coordinator = Coordinator::new(["a"], 1).unwrap();

    let ids: BTreeSet<WorkerId> = (0..5).map(|_| coordinator.register_worker()).collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(ids.first(), Some(&WorkerId(1)));
    assert_eq!(coordinator.stats().registered_workers, 5);
}

#[test]
fn test_unknown_worker_id_is_registered_afresh() {
    let mut coordinator = Coordinator::new(["a"], 1).unwrap();

    let reply = coordinator.schedule(idle(WorkerId(42)));
    assert_eq!(reply.worker_id, WorkerId(1));
    assert_eq!(map_file(&reply), "a");
}

#[test]
fn test_no_input_is_assigned_twice() {
    let mut coordinator = Coordinator::new(["a", "b", "c", "d"], 3).unwrap();

    let replies: Vec<ScheduleReply> = (0..5).map(|_| first_contact(&mut coordinator)).collect();
    let files: BTreeSet<String> = replies
        .iter()
        .filter(|reply| !reply.assignment.is_idle())
        .map(map_file)
        .collect();

    assert_eq!(files.len(), 4);
    assert!(replies[4].assignment.is_idle(), "fifth worker must stay idle");
    assert_eq!(replies[4].status, WorkerStatus::Idle);
    assert_eq!(coordinator.pool().maps_in_flight(), 4);
}

#[test]
fn test_running_worker_gets_its_assignment_echoed() {
    let mut coordinator = Coordinator::new(["a", "b"], 1).unwrap();
    let reply = first_contact(&mut coordinator);
    let id = reply.worker_id;

    for status in [WorkerStatus::MapAssigned, WorkerStatus::MapRunning] {
        let echo = coordinator.schedule(heartbeat(Some(id), status));
        assert_eq!(echo.assignment, reply.assignment);
        assert_eq!(echo.status, status);
    }
    assert_eq!(
        coordinator.pool().pending_map_inputs().collect::<Vec<_>>(),
        vec!["b"],
        "echo must not hand out more work"
    );
}

#[test]
fn test_reduce_waits_for_map_barrier() {
    let mut coordinator = Coordinator::new(["a", "b"], 1).unwrap();
    let w1 = first_contact(&mut coordinator).worker_id;
    let w2 = first_contact(&mut coordinator).worker_id;

    finish_map(&mut coordinator, w1, "a", 1);
    let reply = coordinator.schedule(idle(w1));
    assert!(
        reply.assignment.is_idle(),
        "reduce handed out while map b is in flight"
    );
    assert_eq!(coordinator.phase(), JobPhase::Map);

    finish_map(&mut coordinator, w2, "b", 1);
    assert_eq!(coordinator.phase(), JobPhase::Reduce);
    let reply = coordinator.schedule(idle(w1));
    assert_eq!(reply.status, WorkerStatus::ReduceAssigned);
    match reply.assignment {
        Assignment::Reduce(task) => {
            assert_eq!(task.bucket, 0);
            assert_eq!(task.inputs, vec!["a-1".to_string(), "b-1".to_string()]);
        }
        other => panic!("expected a reduce assignment, got {}", other),
    }
}

#[test]
fn test_two_workers_drain_four_files_into_three_buckets() {
    let mut coordinator = Coordinator::new(["a", "b", "c", "d"], 3).unwrap();
    let mut phase_rx = coordinator.subscribe();
    let w1 = first_contact(&mut coordinator).worker_id;
    let w2 = first_contact(&mut coordinator).worker_id;

    finish_map(&mut coordinator, w1, "a", 3);
    assert_eq!(map_file(&coordinator.schedule(idle(w1))), "c");
    finish_map(&mut coordinator, w2, "b", 3);
    assert_eq!(map_file(&coordinator.schedule(idle(w2))), "d");
    finish_map(&mut coordinator, w1, "c", 3);
    finish_map(&mut coordinator, w2, "d", 3);

    for bucket in 0..3 {
        let expected: Vec<String> = ["a", "b", "c", "d"]
            .iter()
            .map(|file| map_output_locator(file, bucket))
            .collect();
        assert_eq!(coordinator.pool().bucket(bucket).unwrap(), expected.as_slice());
    }

    let r1 = coordinator.schedule(idle(w1));
    let r2 = coordinator.schedule(idle(w2));
    assert_eq!((reduce_bucket(&r1), reduce_bucket(&r2)), (0, 1));
    finish_reduce(&mut coordinator, w1, 0);
    assert_eq!(reduce_bucket(&coordinator.schedule(idle(w1))), 2);
    finish_reduce(&mut coordinator, w2, 1);
    assert!(coordinator.schedule(idle(w2)).assignment.is_idle());
    finish_reduce(&mut coordinator, w1, 2);

    assert_eq!(coordinator.phase(), JobPhase::Done);
    assert_eq!(*phase_rx.borrow_and_update(), JobPhase::Done);
    assert!(coordinator.schedule(idle(w1)).assignment.is_idle());

    let stats = coordinator.stats();
    assert_eq!(stats.completed_maps, 4);
    assert_eq!(stats.reduce_completions, 3);
    assert_eq!(
        stats.final_outputs.values().cloned().collect::<Vec<_>>(),
        vec!["mr-out-0", "mr-out-1", "mr-out-2"]
    );
}

#[test]
fn test_single_worker_single_file() {
    let mut coordinator = Coordinator::new(["x"], 1).unwrap();
    let reply = first_contact(&mut coordinator);
    let id = reply.worker_id;
    assert_eq!(map_file(&reply), "x");

    finish_map(&mut coordinator, id, "x", 1);
    assert_eq!(coordinator.pool().bucket(0).unwrap(), &["x-1".to_string()]);

    let reply = coordinator.schedule(idle(id));
    assert_eq!(reduce_bucket(&reply), 0);
    finish_reduce(&mut coordinator, id, 0);

    assert!(coordinator.schedule(idle(id)).assignment.is_idle());
    assert_eq!(coordinator.reduce_completions(), 1);
}

#[test]
fn test_zero_files_leaves_workers_idle() {
    let mut coordinator = Coordinator::new(Vec::<String>::new(), 3).unwrap();

    let reply = first_contact(&mut coordinator);
    assert!(reply.assignment.is_idle());
    assert_eq!(reply.status, WorkerStatus::Idle);
    assert_eq!(coordinator.phase(), JobPhase::Done);
}

#[test]
fn test_duplicate_reports_are_idempotent() {
    let mut coordinator = Coordinator::new(["x"], 1).unwrap();
    let id = first_contact(&mut coordinator).worker_id;

    finish_map(&mut coordinator, id, "x", 1);
    finish_map(&mut coordinator, id, "x", 1);
    assert_eq!(coordinator.pool().completed_maps(), 1);
    assert_eq!(coordinator.pool().bucket(0).unwrap().len(), 1);

    coordinator.schedule(idle(id));
    finish_reduce(&mut coordinator, id, 0);
    finish_reduce(&mut coordinator, id, 0);
    assert_eq!(coordinator.reduce_completions(), 1);
}

#[test]
fn test_report_for_unassigned_work_is_ignored() {
    let mut coordinator = Coordinator::new(["a", "b"], 1).unwrap();
    let w1 = first_contact(&mut coordinator).worker_id;

    // Reduce before the barrier, map of a file never handed out, unknown worker
    finish_reduce(&mut coordinator, w1, 0);
    finish_map(&mut coordinator, w1, "b", 1);
    finish_map(&mut coordinator, WorkerId(99), "a", 1);

    assert_eq!(coordinator.reduce_completions(), 0);
    assert_eq!(coordinator.pool().completed_maps(), 0);
    assert_eq!(coordinator.pool().map_owner("a"), Some(w1));
    assert_eq!(
        coordinator.pool().pending_map_inputs().collect::<Vec<_>>(),
        vec!["b"]
    );
}

#[test]
fn test_completion_clears_worker_assignment() {
    let mut coordinator = Coordinator::new(["a", "b"], 1).unwrap();
    let id = first_contact(&mut coordinator).worker_id;

    finish_map(&mut coordinator, id, "a", 1);

    let record = coordinator.worker(id).unwrap();
    assert!(record.current.is_idle());
    assert_eq!(record.status, WorkerStatus::Idle);
    assert!(record.assigned_at.is_none());
}

#[test]
fn test_idle_heartbeat_requeues_abandoned_assignment() {
    let mut coordinator = Coordinator::new(["a", "b"], 1).unwrap();
    let w1 = first_contact(&mut coordinator).worker_id;
    let w2 = first_contact(&mut coordinator).worker_id;

    // Worker 2 lost its task and polls as idle: b returns to the pool and is handed out again
    let reply = coordinator.schedule(idle(w2));
    assert_eq!(map_file(&reply), "b");
    assert_eq!(coordinator.pool().map_owner("b"), Some(w2));
    assert_eq!(coordinator.pool().map_owner("a"), Some(w1));
    assert_eq!(coordinator.pool().maps_in_flight(), 2);
}

#[test]
fn test_busy_heartbeat_without_assignment_is_told_idle() {
    let mut coordinator = Coordinator::new(["a"], 1).unwrap();
    let id = coordinator.register_worker();

    let reply = coordinator.schedule(heartbeat(Some(id), WorkerStatus::ReduceRunning));
    assert!(reply.assignment.is_idle());
    assert_eq!(reply.status, WorkerStatus::Idle);
    assert_eq!(
        coordinator.pool().pending_map_inputs().collect::<Vec<_>>(),
        vec!["a"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_assignment_is_reclaimed() {
    let mut coordinator = Coordinator::new(["a", "b"], 1)
        .unwrap()
        .with_task_timeout(Some(Duration::from_secs(5)));
    let w1 = first_contact(&mut coordinator).worker_id;
    assert_eq!(coordinator.pool().map_owner("a"), Some(w1));

    tokio::time::advance(Duration::from_secs(3)).await;
    let w2 = first_contact(&mut coordinator);
    assert_eq!(map_file(&w2), "b", "a is not stale yet");

    tokio::time::advance(Duration::from_secs(3)).await;
    finish_map(&mut coordinator, w2.worker_id, "b", 1);
    let reply = coordinator.schedule(idle(w2.worker_id));
    assert_eq!(map_file(&reply), "a", "a should have been reclaimed");
    assert_eq!(coordinator.stats().reclaimed_tasks, 1);

    // The original holder reports late and is ignored
    finish_map(&mut coordinator, w1, "a", 1);
    assert_eq!(coordinator.pool().map_owner("a"), Some(w2.worker_id));
    assert_eq!(coordinator.pool().completed_maps(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_reclaim_without_timeout() {
    let mut coordinator = Coordinator::new(["a"], 1).unwrap();
    let w1 = first_contact(&mut coordinator).worker_id;

    tokio::time::advance(Duration::from_secs(3600)).await;
    let reply = first_contact(&mut coordinator);

    assert!(reply.assignment.is_idle());
    assert_eq!(coordinator.pool().map_owner("a"), Some(w1));
}
