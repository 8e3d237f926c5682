#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use provision_model::{ActiveModel, Node, Policy, State, now_timestamp};

    use crate::engine::{BootRequest, CheckinRequest, HwIdInput, MkCommand, RegisterRequest};
    use crate::error::EngineError;
    use crate::test_utils::Harness;

    const MAC: &str = "AABBCCDDEE01";

    fn checkin(hw_id: &str) -> CheckinRequest {
        CheckinRequest {
            hw_id: Some(HwIdInput::Joined(hw_id.to_string())),
            last_state: Some("idle".to_string()),
            first_checkin: false,
        }
    }

    fn boot(hw_id: &str) -> BootRequest {
        BootRequest {
            hw_id: Some(HwIdInput::Joined(hw_id.to_string())),
            dhcp_mac: None,
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    async fn only_active(h: &Harness) -> ActiveModel {
        let mut all = h.data().fetch_all::<ActiveModel>().await.unwrap();
        assert_eq!(all.len(), 1);
        all.remove(0)
    }

    /// A web-tagged node bound to an openSUSE policy, optionally with a broker
    async fn bound_node(h: &Harness, with_broker: bool) -> ActiveModel {
        h.tag_rule("web", "role", "web").await;
        let model = h.suse_model().await;
        let policy = h.policy("web servers", &model, &["web"], 0).await;
        if with_broker {
            let broker = h.puppet_broker().await;
            let mut stored: Policy = h.data().get(&policy.uuid).await.unwrap();
            stored.broker_uuid = broker.uuid;
            h.data().persist(&mut stored).await.unwrap();
        }
        h.register(MAC, &[("role", "web")]).await;
        let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
        assert_eq!(reply.command_name, MkCommand::Reboot);
        only_active(h).await
    }

    async fn install_to_first_boot(h: &Harness, am: &str) {
        h.engine.callback(am, "yast", &args(&["start"])).await.unwrap();
        h.engine.callback(am, "yast", &args(&["end"])).await.unwrap();
        h.engine
            .callback(am, "postinstall", &args(&["send_ips", "10.0.0.5"]))
            .await
            .unwrap();
        h.engine.callback(am, "postinstall", &args(&["boot"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_creates_then_refreshes_node() {
        let h = Harness::new();
        let first = h.register("aa:bb:cc:dd:ee:01", &[("role", "web")]).await;
        assert_eq!(first.hw_id, vec![MAC.to_string()]);
        assert_eq!(first.version, 1);

        let again = h.register("AABBCCDDEE01_AABBCCDDEE02", &[("role", "db")]).await;
        assert_eq!(again.uuid, first.uuid);
        assert_eq!(again.version, 2);
        assert_eq!(again.hw_id.len(), 2);
        assert_eq!(again.attribute("role").as_deref(), Some("db"));
        assert_eq!(h.data().fetch_all::<Node>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_validation_messages() {
        let h = Harness::new();
        let err = h.engine.register(RegisterRequest::default()).await.unwrap_err();
        assert_eq!(err.message(), "Must Provide Hardware IDs[hw_id]");

        let err = h
            .engine
            .register(RegisterRequest {
                hw_id: Some(HwIdInput::Joined(MAC.to_string())),
                last_state: Some("idle".to_string()),
                attributes_hash: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "missing_argument");
        assert!(err.message().contains("attributes_hash"));
    }

    #[tokio::test]
    async fn test_checkin_unknown_or_first_checkin_asks_to_register() {
        let h = Harness::new();
        let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
        assert_eq!(reply.command_name, MkCommand::Register);

        h.register(MAC, &[("role", "web")]).await;
        let mut first = checkin(MAC);
        first.first_checkin = true;
        assert_eq!(h.engine.checkin(first).await.unwrap().command_name, MkCommand::Register);
    }

    #[tokio::test]
    async fn test_checkin_without_matching_policy_acknowledges() {
        let h = Harness::new();
        h.register(MAC, &[("role", "db")]).await;
        let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
        assert_eq!(reply.command_name, MkCommand::Acknowledge);
        assert!(h.data().fetch_all::<ActiveModel>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_node_is_asked_to_register() {
        let h = Harness::new();
        let mut node = h.register(MAC, &[("role", "web")]).await;
        node.timestamp = now_timestamp() - 1_000;
        h.data().persist(&mut node).await.unwrap();

        let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
        assert_eq!(reply.command_name, MkCommand::Register);
        // the checkin itself refreshed the timestamp
        let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
        assert_eq!(reply.command_name, MkCommand::Acknowledge);
    }

    #[tokio::test]
    async fn test_unknown_node_boots_newest_microkernel() {
        let h = Harness::new();
        h.mk_image("0.9.0").await;
        let newest = h.mk_image("0.12.0").await;

        let script = h.engine.boot(boot("aa:bb:cc:dd:ee:99")).await;
        assert!(script.starts_with(&format!(
            "#!ipxe\nkernel http://127.0.0.1:8027/razor/image/mk/{}/vmlinuz maxcpus=1",
            newest.uuid
        )));
    }

    #[tokio::test]
    async fn test_boot_without_microkernel_returns_error_script() {
        let h = Harness::new();
        let script = h.engine.boot(boot(MAC)).await;
        assert!(script.starts_with("No microkernel image is registered\n"));
        assert!(script.contains("reboot"));

        let script = h.engine.boot(BootRequest::default()).await;
        assert!(script.starts_with("Must Provide Hardware IDs[hw_id]\n"));
    }

    #[tokio::test]
    async fn test_full_install_without_broker() {
        let h = Harness::new();
        let active = bound_node(&h, false).await;
        assert_eq!(active.current_state(), State::Init);
        assert_eq!(active.model.counter, 1);
        assert_eq!(active.model.hostname(), "web1");

        let script = h.engine.boot(boot("aa:bb:cc:dd:ee:01")).await;
        assert!(script.contains("autoyast="), "{script}");
        assert!(script.contains(&active.uuid));

        install_to_first_boot(&h, &active.uuid).await;
        let done = only_active(&h).await;
        assert_eq!(done.current_state(), State::CompleteNoBroker);
        assert_eq!(done.model.node_ip.as_deref(), Some("10.0.0.5"));

        // installed and finished nodes boot locally and are left alone
        let script = h.engine.boot(boot(MAC)).await;
        assert!(script.contains("sanboot"));
        let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
        assert_eq!(reply.command_name, MkCommand::Acknowledge);
    }

    #[tokio::test]
    async fn test_repeated_heartbeats_do_not_grow_the_log() {
        let h = Harness::new();
        let active = bound_node(&h, false).await;
        for _ in 0..3 {
            let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
            assert_eq!(reply.command_name, MkCommand::Reboot);
        }
        let after = only_active(&h).await;
        assert_eq!(after.log.len(), active.log.len());
        assert_eq!(after.current_state(), State::Init);

        h.engine.callback(&active.uuid, "yast", &args(&["start"])).await.unwrap();
        let logged = only_active(&h).await;
        assert_eq!(logged.log.len(), active.log.len() + 1);
        let last = logged.log.last().unwrap();
        assert_eq!(last.action, "yast_start");
        assert_eq!((last.old_state, last.new_state), (State::Init, State::Preinstall));
    }

    #[tokio::test]
    async fn test_broker_hand_off_success() {
        let h = Harness::new();
        let active = bound_node(&h, true).await;
        install_to_first_boot(&h, &active.uuid).await;
        assert_eq!(only_active(&h).await.current_state(), State::BrokerCheck);

        h.ssh.reply(0, "Notice: Finished catalog run in 4.1 seconds");
        let reply = h.engine.callback(&active.uuid, "broker", &[]).await.unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(only_active(&h).await.current_state(), State::BrokerSuccess);
        let commands = h.ssh.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, "10.0.0.5");

        // nothing left to hand off
        assert_eq!(h.engine.callback(&active.uuid, "broker", &[]).await.unwrap(), "ok");
        assert_eq!(h.ssh.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_broker_wait_is_retried_on_heartbeat() {
        let h = Harness::new();
        let active = bound_node(&h, true).await;
        install_to_first_boot(&h, &active.uuid).await;

        h.ssh.reply(0, "Exiting; no certificate found and waitforcert is disabled");
        assert_eq!(h.engine.callback(&active.uuid, "broker", &[]).await.unwrap(), "ok");
        assert_eq!(only_active(&h).await.current_state(), State::BrokerWait);

        h.ssh.reply(0, "Finished catalog run");
        let reply = h.engine.checkin(checkin(MAC)).await.unwrap();
        assert_eq!(reply.command_name, MkCommand::Acknowledge);
        assert_eq!(only_active(&h).await.current_state(), State::BrokerSuccess);
    }

    #[tokio::test]
    async fn test_broker_failure_replies_error() {
        let h = Harness::new();
        let active = bound_node(&h, true).await;
        install_to_first_boot(&h, &active.uuid).await;

        h.ssh.fail_connect();
        h.ssh.fail_connect();
        assert_eq!(h.engine.callback(&active.uuid, "broker", &[]).await.unwrap(), "error");
        assert_eq!(only_active(&h).await.current_state(), State::BrokerFail);
    }

    #[tokio::test]
    async fn test_callback_errors() {
        let h = Harness::new();
        let active = bound_node(&h, false).await;

        let err = h.engine.callback("", "yast", &[]).await.unwrap_err();
        assert_eq!(err.message(), "Missing active model uuid");
        let err = h.engine.callback(&active.uuid, " ", &[]).await.unwrap_err();
        assert_eq!(err.message(), "Missing callback namespace");
        let err = h.engine.callback("nope", "yast", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::ActiveModelInvalid(_)));
        let err = h.engine.callback(&active.uuid, "kickstart", &[]).await.unwrap_err();
        assert_eq!(err.message(), "Missing callback [kickstart]");

        assert_eq!(
            h.engine.callback(&active.uuid, "yast", &args(&["bogus"])).await.unwrap(),
            "error"
        );
        let answer = h.engine.callback(&active.uuid, "yast", &args(&["file"])).await.unwrap();
        assert!(answer.contains("<hostname>web1</hostname>"));
    }

    #[tokio::test]
    async fn test_full_policy_falls_through_to_next() {
        let h = Harness::new();
        h.tag_rule("web", "role", "web").await;
        let model = h.suse_model().await;
        let capped = h.policy("capped", &model, &["web"], 1).await;
        let open = h.policy("open", &model, &["web"], 0).await;

        h.register(MAC, &[("role", "web")]).await;
        h.register("AABBCCDDEE02", &[("role", "web")]).await;
        h.engine.checkin(checkin(MAC)).await.unwrap();
        h.engine.checkin(checkin("AABBCCDDEE02")).await.unwrap();

        let mut bound: Vec<_> = h
            .data()
            .fetch_all::<ActiveModel>()
            .await
            .unwrap()
            .into_iter()
            .map(|am| am.policy_uuid)
            .collect();
        bound.sort();
        let mut expected = vec![capped.uuid.clone(), open.uuid.clone()];
        expected.sort();
        assert_eq!(bound, expected);

        let capped: Policy = h.data().get(&capped.uuid).await.unwrap();
        assert_eq!(capped.bound_count, 1);
    }

    #[tokio::test]
    async fn test_bind_is_stable_per_node() {
        let h = Harness::new();
        let active = bound_node(&h, false).await;
        let node = h.data().get::<Node>(&active.node_uuid).await.unwrap();
        let again = h.engine.bind(&node).await.unwrap().unwrap();
        assert_eq!(again.uuid, active.uuid);
        assert_eq!(h.data().fetch_all::<ActiveModel>().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_binds_share_one_active_model() {
        let h = Arc::new(Harness::new());
        h.tag_rule("web", "role", "web").await;
        let model = h.suse_model().await;
        let policy = h.policy("web servers", &model, &["web"], 0).await;
        let node = h.register(MAC, &[("role", "web")]).await;

        let binds: Vec<_> = (0..4)
            .map(|_| {
                let h = Arc::clone(&h);
                let node = node.clone();
                tokio::spawn(async move { h.engine.bind(&node).await.unwrap().unwrap() })
            })
            .collect();
        for bind in binds {
            assert_eq!(bind.await.unwrap().uuid, node.uuid);
        }

        let active = only_active(&h).await;
        assert_eq!(active.node_uuid, node.uuid);
        assert_eq!(active.model.counter, 1);
        let stored: Policy = h.data().get(&policy.uuid).await.unwrap();
        assert_eq!(stored.bound_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_callback_leaves_model_unchanged() {
        let h = Harness::new();
        let active = bound_node(&h, true).await;
        h.engine.callback(&active.uuid, "yast", &args(&["start"])).await.unwrap();
        h.engine.callback(&active.uuid, "yast", &args(&["end"])).await.unwrap();
        let first = only_active(&h).await;
        assert_eq!(first.current_state(), State::Postinstall);

        assert_eq!(
            h.engine.callback(&active.uuid, "yast", &args(&["end"])).await.unwrap(),
            "ok"
        );
        let second = only_active(&h).await;
        assert_eq!(second.current_state(), State::Postinstall);
        assert_eq!(second.log, first.log);
        assert_eq!(second.model.broker_uuid, first.model.broker_uuid);
        assert!(h.ssh.commands().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_heartbeats_hand_off_once() {
        let h = Harness::new();
        let active = bound_node(&h, true).await;
        install_to_first_boot(&h, &active.uuid).await;
        assert_eq!(only_active(&h).await.current_state(), State::BrokerCheck);

        h.ssh.slow_exec(Duration::from_millis(50));
        h.ssh.reply(0, "Finished catalog run");
        h.ssh.reply(0, "Finished catalog run");
        let (first, second) = tokio::join!(
            h.engine.checkin(checkin(MAC)),
            h.engine.checkin(checkin(MAC))
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(h.ssh.commands().len(), 1);
        let done = only_active(&h).await;
        assert_eq!(done.current_state(), State::BrokerSuccess);
        assert!(done.hand_off_since.is_none());
    }

    #[tokio::test]
    async fn test_held_hand_off_claim_blocks_until_stale() {
        let h = Harness::new();
        let active = bound_node(&h, true).await;
        install_to_first_boot(&h, &active.uuid).await;

        let mut held = only_active(&h).await;
        held.hand_off_since = Some(now_timestamp());
        h.data().persist(&mut held).await.unwrap();
        assert_eq!(h.engine.callback(&active.uuid, "broker", &[]).await.unwrap(), "ok");
        assert!(h.ssh.commands().is_empty());
        assert_eq!(only_active(&h).await.current_state(), State::BrokerCheck);

        let mut stale = only_active(&h).await;
        stale.hand_off_since = Some(now_timestamp() - 10_000);
        h.data().persist(&mut stale).await.unwrap();
        h.ssh.reply(0, "Finished catalog run");
        assert_eq!(h.engine.callback(&active.uuid, "broker", &[]).await.unwrap(), "ok");
        assert_eq!(h.ssh.commands().len(), 1);
        let done = only_active(&h).await;
        assert_eq!(done.current_state(), State::BrokerSuccess);
        assert!(done.hand_off_since.is_none());
    }
}
