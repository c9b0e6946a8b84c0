//! 任务生命周期：状态机、人工输入、浏览器关闭次数

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use tokio_test::{assert_err, assert_ok};
use udin_batch::job::JobUpdate;
use udin_batch::relay::{self, RelayMessage, RelayOutcome};
use udin_batch::{
    Config, FormValues, GateKind, IdentifierFlow, JobCtx, JobGates, JobManager, JobRunner,
    JobStatus, JobStore, StageTimeouts,
};

fn start(manager: &JobManager) -> String {
    let job_id = JobManager::new_job_id();
    manager.start_job(
        &job_id,
        PathBuf::from("uploads/udins.xlsx"),
        FormValues::from_config(manager.config()),
    );
    job_id
}

#[tokio::test(start_paused = true)]
async fn test_captcha_timeout_fails_only_that_udin() {
    let (manager, probe) = manager_with(
        StaticSource::udins(&["U1", "U2"]),
        MockLauncher::new(Script::captcha_and_pdf(&["U1", "U2"])),
    );
    let job_id = start(&manager);
    let operator = spawn_operator(manager.clone(), job_id.clone(), |current| current == "U2");

    let record = wait_terminal(&manager, &job_id).await;
    operator.await.unwrap();

    assert_eq!(record.status, JobStatus::Done);
    assert_eq!((record.progress, record.total), (2, 2));
    assert_eq!(record.current, None);
    assert!(has_message(&record, "Error processing U1: No captcha entered in time"));
    assert!(has_message(&record, "U1 failed"));
    assert!(has_message(&record, "Downloaded PDF for U2"));
    assert!(has_message(&record, "U2 completed"));
    assert_eq!(record.messages.last().unwrap(), "All UDINs processed.");
    assert_eq!(record.last_pdf.as_deref(), Some("U2.pdf"));
    assert!(!record.awaiting_captcha);
    assert!(record.captcha_b64.is_none());

    // U1 失败后没有继续走 OTP
    assert_eq!(probe.filled("#captcha"), vec!["ab12"]);
    assert_eq!(probe.filled("#otpMobile"), vec!["111111"]);
    assert_eq!(probe.filled("#otpEmail"), vec!["222222"]);
    assert_eq!(probe.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_column_ends_in_error_without_browser() {
    let (manager, probe) = manager_with(
        StaticSource::missing_column("UDIN"),
        MockLauncher::new(Script::default()),
    );
    let job_id = start(&manager);

    let record = wait_terminal(&manager, &job_id).await;
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(record.progress, 0);
    assert!(has_message(&record, "Excel must have 'UDIN' column"));
    assert_eq!(probe.launches(), 0);
    assert_eq!(probe.shutdowns(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_ends_in_error() {
    let (manager, probe) = manager_with(StaticSource::udins(&["U1"]), MockLauncher::failing());
    let job_id = start(&manager);

    let record = wait_terminal(&manager, &job_id).await;
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(record.total, 1);
    assert_eq!(record.progress, 0);
    assert!(record
        .messages
        .last()
        .unwrap()
        .starts_with("Browser failed to start"));
    assert_eq!(probe.shutdowns(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_captcha_and_no_pdf_still_completes() {
    let (manager, probe) = manager_with(
        StaticSource::udins(&["U1"]),
        MockLauncher::new(Script::default()),
    );
    let job_id = start(&manager);
    let operator = spawn_operator(manager.clone(), job_id.clone(), |_| true);

    let record = wait_terminal(&manager, &job_id).await;
    operator.await.unwrap();

    assert_eq!(record.status, JobStatus::Done);
    assert!(has_message(&record, "No captcha found; continuing..."));
    assert!(has_message(&record, "No PDF found for U1"));
    assert!(has_message(&record, "U1 completed"));
    assert_eq!(record.last_pdf, None);
    assert_eq!(probe.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_captcha_rendered_late_is_still_found() {
    // 验证码图片要到第三次查找时才出现
    let script = Script {
        captcha_after_lookups: 2,
        ..Script::captcha_and_pdf(&["U1"])
    };
    let (manager, probe) = manager_with(StaticSource::udins(&["U1"]), MockLauncher::new(script));
    let job_id = start(&manager);
    let operator = spawn_operator(manager.clone(), job_id.clone(), |_| true);

    let record = wait_terminal(&manager, &job_id).await;
    operator.await.unwrap();

    assert_eq!(record.status, JobStatus::Done);
    assert!(has_message(&record, "Awaiting captcha input..."));
    assert!(!has_message(&record, "No captcha found; continuing..."));
    assert!(has_message(&record, "Downloaded PDF for U1"));
    assert_eq!(probe.filled("#captcha"), vec!["ab12"]);
    assert!(probe.captcha_lookups() >= 3);
    assert_eq!(probe.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_udin_list_completes_immediately() {
    let (manager, probe) = manager_with(
        StaticSource::udins(&[]),
        MockLauncher::new(Script::default()),
    );
    let job_id = start(&manager);

    let record = wait_terminal(&manager, &job_id).await;
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!((record.progress, record.total), (0, 0));
    assert_eq!(record.current, None);
    assert_eq!(record.messages.last().unwrap(), "All UDINs processed.");
    assert_eq!(probe.shutdowns(), 1);
    assert!(probe.filled("#Udin").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_driver_panic_shuts_browser_and_ends_in_error() {
    let script = Script {
        panic_on: Some("U1".to_string()),
        ..Script::default()
    };
    let (manager, probe) = manager_with(
        StaticSource::udins(&["U1", "U2"]),
        MockLauncher::new(script),
    );
    let job_id = start(&manager);

    let record = wait_terminal(&manager, &job_id).await;
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(record.messages.last().unwrap(), "Worker crashed unexpectedly");
    assert_eq!(record.current, None);
    assert!(!record.awaiting_captcha);
    assert!(!record.awaiting_otp);
    // U2 没有被处理，浏览器仍然被关闭
    assert!(probe.filled("#Udin").is_empty());
    assert_eq!(probe.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_oldest_finished_jobs_are_evicted() {
    let config = Config {
        max_finished_jobs: 1,
        ..test_config()
    };
    let manager = JobManager::new(
        config,
        Arc::new(StaticSource::missing_column("UDIN")),
        Arc::new(MockLauncher::new(Script::default())),
    );

    let first = start(&manager);
    wait_terminal(&manager, &first).await;
    // 保证两条记录的更新时间不同
    std::thread::sleep(Duration::from_millis(5));
    let second = start(&manager);
    wait_terminal(&manager, &second).await;

    // 第三个任务启动时只保留最新的一个已结束任务
    let third = start(&manager);
    assert_err!(manager.snapshot(&first));
    assert!(!manager.contains(&first));
    assert_ok!(manager.snapshot(&second));
    assert!(manager.contains(&second));
    assert_ok!(manager.snapshot(&third));

    wait_terminal(&manager, &third).await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_udin_field_fails_item() {
    let script = Script {
        udin_field_missing: true,
        ..Script::default()
    };
    let (manager, probe) = manager_with(
        StaticSource::udins(&["U1", "U2"]),
        MockLauncher::new(script),
    );
    let job_id = start(&manager);

    let record = wait_terminal(&manager, &job_id).await;
    assert_eq!(record.status, JobStatus::Done);
    assert!(has_message(&record, "Error processing U1: Element not found: #Udin"));
    assert!(has_message(&record, "U2 failed"));
    assert_eq!(record.progress, 2);
    assert_eq!(probe.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_otp_timeout_names_missing_channel() {
    let (manager, _probe) = manager_with(
        StaticSource::udins(&["U1"]),
        MockLauncher::new(Script::default()),
    );
    let job_id = start(&manager);

    // 只送手机 OTP
    let watcher = {
        let manager = manager.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let record = manager.snapshot(&job_id).unwrap();
                if record.status.is_terminal() {
                    return;
                }
                if record.awaiting_otp {
                    let _ = manager.supply(&job_id, GateKind::MobileOtp, "111111");
                }
            }
        })
    };

    let record = wait_terminal(&manager, &job_id).await;
    watcher.await.unwrap();

    assert_eq!(record.status, JobStatus::Done);
    assert!(!record.awaiting_otp);
    assert!(has_message(
        &record,
        "Error processing U1: Did not receive both Mobile and Email OTPs in time (missing: email)"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_otps_accepted_in_either_order() {
    let store = Arc::new(JobStore::new());
    store.create("job-1", "udins.xlsx");
    let gates = JobGates::new();
    let ctx = JobCtx::new("job-1", store.clone(), gates.clone());

    let launcher = MockLauncher::new(Script::default());
    let probe = launcher.probe.clone();
    let flow = IdentifierFlow::new(
        "https://portal.test/search",
        FormValues::default(),
        StageTimeouts::from(&test_config()),
    );
    let runner = JobRunner::new(
        ctx,
        PathBuf::from("udins.xlsx"),
        Arc::new(StaticSource::udins(&["U1"])),
        Arc::new(launcher),
        flow,
        Duration::ZERO,
    );
    let task = tokio::spawn(runner.run());

    while !store.read("job-1").unwrap().awaiting_otp {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // 先到邮箱，一分钟后才到手机
    gates.supply(GateKind::EmailOtp, "222222");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(store.read("job-1").unwrap().awaiting_otp);
    gates.supply(GateKind::MobileOtp, "111111");

    let stats = task.await.unwrap();
    assert_eq!(stats.success, 1);
    assert_eq!(probe.filled("#otpMobile"), vec!["111111"]);
    assert_eq!(probe.filled("#otpEmail"), vec!["222222"]);
    assert_eq!(store.read("job-1").unwrap().status, JobStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_relay_reaches_waiting_job() {
    let (manager, probe) = manager_with(
        StaticSource::udins(&["U1"]),
        MockLauncher::new(Script::default()),
    );
    let job_id = start(&manager);

    while !manager.snapshot(&job_id).unwrap().awaiting_otp {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let outcome = relay::route(
        &manager,
        &RelayMessage {
            body: Some("Your OTP is 4821".into()),
            ..Default::default()
        },
    );
    assert_eq!(
        outcome,
        RelayOutcome::Ok {
            otp: "4821".into(),
            job_id: job_id.clone(),
            channel: "mobile",
        }
    );

    let outcome = relay::route(
        &manager,
        &RelayMessage {
            text: Some("Email code 905512".into()),
            job_id: Some(job_id.clone()),
            channel: Some("email".into()),
            ..Default::default()
        },
    );
    assert!(matches!(outcome, RelayOutcome::Ok { channel: "email", .. }));

    let record = wait_terminal(&manager, &job_id).await;
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(probe.filled("#otpMobile"), vec!["4821"]);
    assert_eq!(probe.filled("#otpEmail"), vec!["905512"]);
}

#[tokio::test]
async fn test_relay_without_waiting_job() {
    let (manager, _probe) = manager_with(
        StaticSource::udins(&[]),
        MockLauncher::new(Script::default()),
    );

    let message = RelayMessage {
        body: Some("OTP 4821".into()),
        job_id: Some("unknown".into()),
        ..Default::default()
    };
    assert_eq!(relay::route(&manager, &message), RelayOutcome::NoWaitingJob);
    assert_eq!(
        relay::route(&manager, &RelayMessage::default()),
        RelayOutcome::NoOtp
    );
}

#[tokio::test]
async fn test_supply_to_unknown_job_is_not_found() {
    let (manager, _probe) = manager_with(
        StaticSource::udins(&[]),
        MockLauncher::new(Script::default()),
    );
    assert_err!(manager.supply("nope", GateKind::Captcha, "x"));
    assert_err!(manager.snapshot("nope"));

    // 记录仓库中存在但没有执行器的任务不会收到输入
    manager.store().create("orphan", "f.xlsx");
    manager
        .store()
        .merge_update("orphan", JobUpdate::new().awaiting_otp(true));
    assert_err!(manager.supply("orphan", GateKind::MobileOtp, "1234"));
    assert_ok!(manager.store().read("orphan"));
}
