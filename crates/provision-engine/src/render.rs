//! Script rendering
//!
//! Installer answer files and boot scripts come from a `ScriptRenderer`.
//! The built-in renderer produces compact scripts from a `RenderContext`;
//! deployments with their own templates plug in another implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use provision_model::{ActiveModel, ImageRecord, ModelKind};

use crate::config::ProvisionConfig;
use crate::error::EngineError;

/// Artifacts a model can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    BootInstall,
    BootLocal,
    Autoyast,
    Kickstart,
    OsBoot,
    OsComplete,
    XenserverInstallXml,
    IsolinuxCfg,
    Postinstall,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BootInstall => "boot_install",
            Self::BootLocal => "boot_local",
            Self::Autoyast => "autoyast",
            Self::Kickstart => "kickstart",
            Self::OsBoot => "os_boot",
            Self::OsComplete => "os_complete",
            Self::XenserverInstallXml => "xenserverinstall_xml",
            Self::IsolinuxCfg => "isolinux_cfg",
            Self::Postinstall => "postinstall",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a template may reference
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub kind: ModelKind,
    pub label: String,
    pub active_model_uuid: String,
    pub node_uuid: String,
    pub policy_uuid: String,
    pub hostname: String,
    pub node_ip: Option<String>,
    pub has_broker: bool,
    pub metadata: BTreeMap<String, String>,
    pub api_svc_uri: String,
    /// Image root, including the image uuid
    pub image_uri: String,
    pub kernel: String,
    pub initrd: String,
}

impl RenderContext {
    pub fn new(
        active: &ActiveModel,
        image: Option<&ImageRecord>,
        config: &ProvisionConfig,
    ) -> Self {
        let model = &active.model;
        let (image_uri, kernel, initrd) = image.map_or_else(
            || (String::new(), String::new(), String::new()),
            |img| {
                (
                    format!("{}/{}", config.image_svc_uri(img.kind.as_str()), img.uuid),
                    img.kernel.clone(),
                    img.initrd.clone(),
                )
            },
        );
        Self {
            kind: model.kind,
            label: active.label.clone(),
            active_model_uuid: active.uuid.clone(),
            node_uuid: active.node_uuid.clone(),
            policy_uuid: active.policy_uuid.clone(),
            hostname: model.hostname(),
            node_ip: model.node_ip.clone(),
            has_broker: model.has_broker(),
            metadata: model.metadata.clone(),
            api_svc_uri: config.api_svc_uri(),
            image_uri,
            kernel,
            initrd,
        }
    }

    /// Callback URL for `namespace` on this active model
    pub fn callback_url(&self, namespace: &str) -> String {
        format!(
            "{}/policy/callback/{}/{namespace}",
            self.api_svc_uri, self.active_model_uuid
        )
    }

    pub fn meta(&self, key: &str) -> &str {
        self.metadata.get(key).map_or("", String::as_str)
    }
}

/// Renders installer artifacts
pub trait ScriptRenderer: Send + Sync {
    fn render(&self, stage: Stage, ctx: &RenderContext) -> Result<String, EngineError>;
}

/// Built-in scripts, enough to drive the install protocol end to end
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

impl ScriptRenderer for BuiltinRenderer {
    fn render(&self, stage: Stage, ctx: &RenderContext) -> Result<String, EngineError> {
        let script = match stage {
            Stage::BootInstall => boot_install(ctx),
            Stage::BootLocal => {
                "#!ipxe\necho Booting from local disk\nsanboot --no-describe --drive 0x80\n".to_string()
            }
            Stage::Autoyast => autoyast(ctx),
            Stage::Kickstart => kickstart(ctx),
            Stage::OsBoot => os_boot(ctx),
            Stage::OsComplete => os_complete(ctx),
            Stage::XenserverInstallXml => xenserver_answerfile(ctx),
            Stage::IsolinuxCfg => isolinux_cfg(ctx),
            Stage::Postinstall => xenserver_postinstall(ctx),
        };
        Ok(script)
    }
}

fn kernel_args(ctx: &RenderContext) -> String {
    match ctx.kind {
        ModelKind::Opensuse12 => format!(
            "install={} autoyast={}/file hostname={} textmode=1",
            ctx.image_uri,
            ctx.callback_url("yast"),
            ctx.hostname
        ),
        ModelKind::Redhat6 | ModelKind::Oraclelinux6 => format!(
            "ks={}/file ksdevice=bootif ip=dhcp",
            ctx.callback_url("kickstart")
        ),
        ModelKind::XenserverBoston | ModelKind::XenserverTampa => format!(
            "dom0_mem=752M com1=115200,8n1 console=com1,vga --- vmlinuz answerfile={}/file install --- install.img",
            ctx.callback_url("xenserverinstall_xml")
        ),
    }
}

fn boot_install(ctx: &RenderContext) -> String {
    let mut s = String::from("#!ipxe\n");
    let _ = writeln!(s, "echo Reached the install stage of {}", ctx.label);
    let _ = writeln!(
        s,
        "kernel {}/{} {} || goto error",
        ctx.image_uri,
        ctx.kernel,
        kernel_args(ctx)
    );
    let _ = writeln!(s, "initrd {}/{} || goto error", ctx.image_uri, ctx.initrd);
    s.push_str("boot || goto error\n\n:error\necho ERROR, will reboot in 15\nsleep 15\nreboot\n");
    s
}

fn autoyast(ctx: &RenderContext) -> String {
    format!(
        r#"<?xml version="1.0"?>
<!DOCTYPE profile>
<profile xmlns="http://www.suse.com/1.0/yast2ns" xmlns:config="http://www.suse.com/1.0/configns">
  <networking>
    <dns><hostname>{hostname}</hostname></dns>
  </networking>
  <users config:type="list">
    <user><username>root</username><user_password>{password}</user_password></user>
  </users>
  <scripts>
    <init-scripts config:type="list">
      <script><source><![CDATA[
curl -s {post}/inject | sh
]]></source></script>
    </init-scripts>
  </scripts>
  <report><messages><show config:type="boolean">false</show></messages></report>
  <!-- {start}/start -->
</profile>
"#,
        hostname = ctx.hostname,
        password = ctx.meta("root_password"),
        post = ctx.callback_url("postinstall"),
        start = ctx.callback_url("yast"),
    )
}

fn kickstart(ctx: &RenderContext) -> String {
    format!(
        "install\nurl --url {image}\nlang en_US.UTF-8\nkeyboard us\nrootpw {password}\n\
network --bootproto dhcp --hostname {hostname}\nzerombr\nclearpart --all --initlabel\n\
autopart\nreboot\n\n%pre\ncurl -s {ks}/start\n%end\n\n%post\ncurl -s {ks}/end\n\
curl -s {post}/inject | sh\n%end\n",
        image = ctx.image_uri,
        password = ctx.meta("root_password"),
        hostname = ctx.hostname,
        ks = ctx.callback_url("kickstart"),
        post = ctx.callback_url("postinstall"),
    )
}

fn os_boot(ctx: &RenderContext) -> String {
    let post = ctx.callback_url("postinstall");
    format!(
        "#!/bin/bash\n# first boot of {hostname}\n\
IP=$(hostname -I | awk '{{print $1}}')\ncurl -s {post}/send_ips/$IP\n\
curl -s {post}/boot | sh\n",
        hostname = ctx.hostname,
    )
}

fn os_complete(ctx: &RenderContext) -> String {
    let mut s = format!(
        "#!/bin/bash\necho \"{} provisioned by policy {}\" > /etc/motd\n",
        ctx.hostname, ctx.label
    );
    if ctx.has_broker {
        let _ = writeln!(s, "curl -s {}/handoff", ctx.callback_url("broker"));
    }
    s
}

fn xenserver_answerfile(ctx: &RenderContext) -> String {
    let ip = ctx.node_ip.as_deref().unwrap_or("");
    format!(
        r#"<?xml version="1.0"?>
<installation srtype="ext">
  <primary-disk>sda</primary-disk>
  <keymap>us</keymap>
  <root-password>{password}</root-password>
  <source type="url">{image}</source>
  <post-install-script type="url">{post}/download</post-install-script>
  <admin-interface name="eth0" proto="static">
    <ip>{ip}</ip>
    <subnet-mask>{subnet}</subnet-mask>
    <gateway>{gateway}</gateway>
  </admin-interface>
  <nameserver>{nameserver}</nameserver>
  <hostname>{hostname}</hostname>
  <timezone>UTC</timezone>
  <ntp-server>{ntp}</ntp-server>
</installation>
"#,
        password = ctx.meta("root_password"),
        image = ctx.image_uri,
        post = ctx.callback_url("postinstall"),
        subnet = ctx.meta("ip_range_subnet"),
        gateway = ctx.meta("gateway"),
        nameserver = ctx.meta("nameserver"),
        hostname = ctx.hostname,
        ntp = ctx.meta("ntpserver"),
    )
}

fn isolinux_cfg(ctx: &RenderContext) -> String {
    format!(
        "default xenserver\nlabel xenserver\n  kernel mboot.c32\n  append xen.gz {}\n",
        kernel_args(ctx)
    )
}

fn xenserver_postinstall(ctx: &RenderContext) -> String {
    let post = ctx.callback_url("postinstall");
    format!(
        "#!/bin/bash\n# post-install for {hostname}\n\
curl -s {post}/inject > /etc/firstboot.d/99-razor\nchmod +x /etc/firstboot.d/99-razor\n\
curl -s {post}/end\n",
        hostname = ctx.hostname,
    )
}
