use nxweb_core::db::open_db_in_memory;
use nxweb_core::model::project::NewProject;
use nxweb_core::model::schedule::{NewSchedule, SchedulePatch};
use nxweb_core::model::task::{NewTask, TaskStatus};
use nxweb_core::repo::project_repo::SqliteProjectRepository;
use nxweb_core::repo::schedule_repo::SqliteScheduleRepository;
use nxweb_core::repo::task_repo::SqliteTaskRepository;
use nxweb_core::service::schedule_service::NEXT_RUN_OFFSET_MS;
use nxweb_core::{PageRequest, ProjectService, ScheduleService, ServiceError, TaskService};
use rusqlite::Connection;

fn schedules(conn: &Connection) -> ScheduleService<SqliteScheduleRepository<'_>> {
    ScheduleService::new(SqliteScheduleRepository::new(conn))
}

fn tasks(conn: &Connection) -> TaskService<SqliteTaskRepository<'_>> {
    TaskService::new(SqliteTaskRepository::new(conn))
}

fn seed_project(conn: &Connection) -> String {
    ProjectService::new(SqliteProjectRepository::new(conn))
        .create_project(NewProject {
            name: "news".into(),
            ..Default::default()
        })
        .unwrap()
        .id
}

fn new_schedule(project_id: &str, cron: Option<&str>) -> NewSchedule {
    NewSchedule {
        name: "nightly".into(),
        cron: cron.map(str::to_string),
        project_id: project_id.to_string(),
        ..Default::default()
    }
}

#[test]
fn create_with_cron_sets_placeholder_next_run() {
    let conn = open_db_in_memory().unwrap();
    let project_id = seed_project(&conn);

    let schedule = schedules(&conn)
        .create_schedule(new_schedule(&project_id, Some("0 3 * * *")))
        .unwrap();
    assert!(schedule.active);
    assert_eq!(
        schedule.next_run,
        Some(schedule.created_at + NEXT_RUN_OFFSET_MS)
    );

    let without_cron = schedules(&conn)
        .create_schedule(new_schedule(&project_id, None))
        .unwrap();
    assert_eq!(without_cron.next_run, None);
}

#[test]
fn create_rejects_bad_cron_and_missing_project() {
    let conn = open_db_in_memory().unwrap();
    let project_id = seed_project(&conn);

    let err = schedules(&conn)
        .create_schedule(new_schedule(&project_id, Some("0 3 * *")))
        .unwrap_err();
    match err {
        ServiceError::InvalidInput(message) => assert_eq!(message, "Invalid cron expression"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = schedules(&conn)
        .create_schedule(new_schedule("missing", Some("0 3 * * *")))
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[test]
fn update_recomputes_next_run_unless_deactivated() {
    let conn = open_db_in_memory().unwrap();
    let project_id = seed_project(&conn);
    let service = schedules(&conn);
    let schedule = service
        .create_schedule(new_schedule(&project_id, None))
        .unwrap();

    let updated = service
        .update_schedule(
            &schedule.id,
            SchedulePatch {
                cron: Some("*/10 * * * *".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.cron.as_deref(), Some("*/10 * * * *"));
    assert_eq!(
        updated.next_run,
        Some(updated.updated_at + NEXT_RUN_OFFSET_MS)
    );

    let paused = service
        .update_schedule(
            &schedule.id,
            SchedulePatch {
                cron: Some("*/15 * * * *".into()),
                active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!paused.active);
    assert_eq!(paused.next_run, None);

    service.activate(&schedule.id).unwrap();
    let switched_off = service
        .update_schedule(
            &schedule.id,
            SchedulePatch {
                active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(switched_off.cron.as_deref(), Some("*/15 * * * *"));
    assert_eq!(switched_off.next_run, None);

    let err = service
        .update_schedule("missing", SchedulePatch::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[test]
fn activate_and_deactivate_toggle_next_run() {
    let conn = open_db_in_memory().unwrap();
    let project_id = seed_project(&conn);
    let service = schedules(&conn);
    let schedule = service
        .create_schedule(new_schedule(&project_id, Some("0 3 * * *")))
        .unwrap();

    let off = service.deactivate(&schedule.id).unwrap();
    assert!(!off.active);
    assert_eq!(off.next_run, None);

    let on = service.activate(&schedule.id).unwrap();
    assert!(on.active);
    assert!(on.next_run.is_some());

    let plain = service
        .create_schedule(new_schedule(&project_id, None))
        .unwrap();
    assert_eq!(service.activate(&plain.id).unwrap().next_run, None);
}

#[test]
fn run_starts_every_attached_task() {
    let conn = open_db_in_memory().unwrap();
    let project_id = seed_project(&conn);
    let schedule = schedules(&conn)
        .create_schedule(new_schedule(&project_id, None))
        .unwrap();

    let task_service = tasks(&conn);
    let mut attached = Vec::new();
    for name in ["a", "b"] {
        let task = task_service
            .create_task(NewTask {
                name: name.into(),
                project_id: project_id.clone(),
                schedule_id: Some(schedule.id.clone()),
                progress: Some(60.0),
                ..Default::default()
            })
            .unwrap();
        attached.push(task.id);
    }
    task_service
        .create_task(NewTask {
            name: "unrelated".into(),
            project_id: project_id.clone(),
            ..Default::default()
        })
        .unwrap();

    let result = schedules(&conn).run(&schedule.id).unwrap();
    assert!(result.success);
    assert_eq!(result.message, "Started 2 tasks");
    assert_eq!(result.tasks.len(), 2);
    for task in &result.tasks {
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, 0.0);
        assert!(task.started_at.is_some());
    }

    let logs = task_service
        .list_logs(&attached[0], None, PageRequest::default())
        .unwrap();
    assert_eq!(
        logs.logs[0].message,
        "Task started by manual schedule execution"
    );

    let detail = schedules(&conn).get_schedule(&schedule.id).unwrap();
    assert!(detail.schedule.last_run.is_some());
    assert_eq!(detail.tasks.len(), 2);
    assert_eq!(detail.project.name, "news");
}

#[test]
fn deleting_schedule_detaches_tasks() {
    let conn = open_db_in_memory().unwrap();
    let project_id = seed_project(&conn);
    let schedule = schedules(&conn)
        .create_schedule(new_schedule(&project_id, None))
        .unwrap();
    let task = tasks(&conn)
        .create_task(NewTask {
            name: "a".into(),
            project_id: project_id.clone(),
            schedule_id: Some(schedule.id.clone()),
            ..Default::default()
        })
        .unwrap();

    let listed = schedules(&conn).list_schedules().unwrap();
    assert_eq!(listed[0].count.tasks, 1);

    schedules(&conn).delete_schedule(&schedule.id).unwrap();
    let detail = tasks(&conn).get_task(&task.id).unwrap();
    assert_eq!(detail.task.schedule_id, None);
    assert!(detail.schedule.is_none());

    assert!(matches!(
        schedules(&conn).delete_schedule(&schedule.id).unwrap_err(),
        ServiceError::NotFound(_)
    ));
}
