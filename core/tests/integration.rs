use std::{io, sync::Arc};

use anyhow::anyhow;
use gantry::{
    plugin_api::{
        renderer, runner, validation_errors_renderer, ArgSchema, Dependency, Renderer,
        SetupContext, SetupError, SetupRegistry, ValidationErrorsRenderer,
    },
    App, AppConfig, CliError, CommandDef, ExtensionPhase, Hooks, Plugin,
};
use gantry_globals::{globals, timing_into, RunRecorder, GLOBALS_ID};
use parking_lot::Mutex;

struct LogWriter(Arc<Mutex<Vec<u8>>>);
impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
struct MakeLogWriter(Arc<Mutex<Vec<u8>>>);
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeLogWriter {
    type Writer = LogWriter;
    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}

type Trace = Arc<Mutex<Vec<String>>>;

/// Plugin whose setup appends its id to `trace`.
fn traced(id: &str, deps: &[&str], trace: &Trace) -> Plugin {
    let mut plugin = Plugin::new(id);
    for dep in deps {
        plugin = plugin.depends_on(*dep);
    }
    let trace = Arc::clone(trace);
    let name = id.to_string();
    plugin.setup(move |_ctx: SetupContext| {
        trace.lock().push(name.clone());
        async { Ok(()) }
    })
}

fn echo() -> CommandDef {
    CommandDef::new("echo")
        .about("Echo the message")
        .arg("message", ArgSchema::string().short('m').default_value("hi"))
        .handler(|ctx| async move {
            Ok(ctx
                .value("message")
                .and_then(|v| v.as_str())
                .map(str::to_string))
        })
}

fn app() -> App {
    App::new(echo())
        .name("tool")
        .version("2.0.0")
        .description("Integration test app")
}

#[tokio::test]
async fn dependencies_set_up_first() {
    let trace = Trace::default();
    let out = app()
        .plugin(traced("b", &["a"], &trace))
        .plugin(traced("a", &[], &trace))
        .run(["-m", "ok"])
        .await
        .unwrap();
    assert_eq!(out.as_deref(), Some("ok"));
    assert_eq!(*trace.lock(), ["a", "b"]);
}

#[tokio::test]
async fn missing_dependency_aborts_before_setup() {
    let trace = Trace::default();
    let err = app()
        .plugin(traced("x", &["y"], &trace))
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    match &err {
        CliError::MissingDependency { plugin, dependency } => {
            assert_eq!(plugin.as_str(), "x");
            assert_eq!(dependency.as_str(), "y");
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("'x'") && message.contains("'y'"));
    assert!(trace.lock().is_empty());
}

#[tokio::test]
async fn circular_dependency_aborts() {
    let trace = Trace::default();
    let err = app()
        .plugin(traced("m", &["n"], &trace))
        .plugin(traced("n", &["m"], &trace))
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::CircularDependency { .. }));
    assert!(err.to_string().contains("m -> n -> m"));
    assert!(trace.lock().is_empty());
}

#[derive(Debug, thiserror::Error)]
#[error("tagged failure")]
struct Tagged;

#[tokio::test]
async fn decorator_rethrow_keeps_the_error() {
    let command = CommandDef::new("fail").handler(|_ctx| async { Err(anyhow::Error::new(Tagged)) });
    let observed = Arc::new(Mutex::new(false));
    let seen = Arc::clone(&observed);
    let rethrow = Plugin::new("rethrow").setup(move |ctx: SetupContext| {
        let seen = Arc::clone(&seen);
        async move {
            ctx.decorate_command(move |next| {
                let seen = Arc::clone(&seen);
                runner(move |ctx| {
                    let next = next.clone();
                    let seen = Arc::clone(&seen);
                    async move {
                        let result = next(ctx).await;
                        if result.is_err() {
                            *seen.lock() = true;
                        }
                        result
                    }
                })
            })?;
            Ok::<_, anyhow::Error>(())
        }
    });

    let err = App::new(command)
        .plugin(rethrow)
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(*observed.lock());
    match err {
        CliError::Command(source) => assert!(source.is::<Tagged>()),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn decorators_wrap_in_registration_order() {
    let trace = Trace::default();
    let layer = |tag: &'static str, trace: &Trace| {
        let trace = Arc::clone(trace);
        Plugin::new(tag).setup(move |ctx: SetupContext| {
            let trace = Arc::clone(&trace);
            async move {
                ctx.decorate_command(move |next| {
                    let trace = Arc::clone(&trace);
                    runner(move |ctx| {
                        let next = next.clone();
                        let trace = Arc::clone(&trace);
                        async move {
                            trace.lock().push(format!("before-{tag}"));
                            let out = next(ctx).await;
                            trace.lock().push(format!("after-{tag}"));
                            out
                        }
                    })
                })?;
                Ok::<_, anyhow::Error>(())
            }
        })
    };
    let inner = Arc::clone(&trace);
    let command = CommandDef::new("run").handler(move |_ctx| {
        inner.lock().push("base".into());
        async { Ok(None) }
    });

    App::new(command)
        .plugin(layer("A", &trace))
        .plugin(layer("B", &trace))
        .run(Vec::<String>::new())
        .await
        .unwrap();
    assert_eq!(
        *trace.lock(),
        ["before-A", "before-B", "base", "after-B", "after-A"]
    );
}

struct Store {
    prefix: String,
}

struct Greeter {
    greeting: String,
}

#[tokio::test]
async fn extensions_see_their_dependencies() {
    let store = Plugin::new("store").extension(|ctx| async move {
        let prefix = ctx
            .value("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(Store { prefix })
    });
    let greeter = Plugin::new("greeter")
        .depends_on("store")
        .extension(|ctx| async move {
            let prefix = ctx
                .extension::<Store>("store")
                .map(|s| s.prefix.clone())
                .unwrap_or_default();
            Ok(Greeter {
                greeting: format!("{prefix}, friend"),
            })
        });
    let witnessed = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&witnessed);
    let observer = Plugin::new("observer")
        .depends_on(Dependency::optional("greeter"))
        .on_extension(move |extensions, meta| {
            let mut ids: Vec<String> = extensions.ids().map(ToString::to_string).collect();
            ids.sort();
            seen.lock().push(format!("{}:{}", meta.name, ids.join(",")));
            async { Ok(()) }
        });

    let command = CommandDef::new("hello")
        .arg("message", ArgSchema::string())
        .handler(|ctx| async move {
            Ok(ctx
                .extension::<Greeter>("greeter")
                .map(|g| g.greeting.clone()))
        });
    let out = App::new(command)
        .plugins([observer, greeter, store])
        .run(["--message", "hey"])
        .await
        .unwrap();
    assert_eq!(out.as_deref(), Some("hey, friend"));
    assert_eq!(*witnessed.lock(), ["hello:greeter,store"]);
}

#[tokio::test]
async fn every_run_gets_a_fresh_namespace() {
    let builds = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&builds);
    let plugin = Plugin::new("counter").extension(move |_ctx| {
        let n = {
            let mut builds = counter.lock();
            *builds += 1;
            *builds
        };
        async move { Ok(n) }
    });
    let command = CommandDef::new("show").handler(|ctx| async move {
        Ok(ctx.extension::<i32>("counter").map(|n| n.to_string()))
    });
    let app = App::new(command).plugin(plugin);
    assert_eq!(app.run(Vec::<String>::new()).await.unwrap().as_deref(), Some("1"));
    assert_eq!(app.run(Vec::<String>::new()).await.unwrap().as_deref(), Some("2"));
}

#[tokio::test]
async fn setup_failure_names_the_plugin() {
    let broken = Plugin::new("broken")
        .setup(|_ctx: SetupContext| async { Err(anyhow!("no database")) });
    let err = app().plugin(broken).run(Vec::<String>::new()).await.unwrap_err();
    assert!(matches!(&err, CliError::PluginSetup { plugin, .. } if plugin.as_str() == "broken"));
    assert!(err.to_string().contains("no database"));
}

#[tokio::test]
async fn extension_failures_report_their_phase() {
    let factory = Plugin::new("factory").extension(|_ctx| async {
        Err::<(), _>(anyhow!("cannot build"))
    });
    let err = app().plugin(factory).run(Vec::<String>::new()).await.unwrap_err();
    assert!(matches!(
        err,
        CliError::PluginExtension {
            phase: ExtensionPhase::Extension,
            ..
        }
    ));

    let callback = Plugin::new("callback")
        .on_extension(|_extensions, _meta| async { Err(anyhow!("rejected")) });
    let err = app().plugin(callback).run(Vec::<String>::new()).await.unwrap_err();
    assert!(matches!(
        &err,
        CliError::PluginExtension {
            phase: ExtensionPhase::OnExtension,
            plugin,
            ..
        } if plugin.as_str() == "callback"
    ));
}

#[tokio::test]
async fn hooks_surround_the_command() {
    let trace = Trace::default();
    let before = Arc::clone(&trace);
    let after = Arc::clone(&trace);
    let hooks = Hooks::new()
        .on_before_command(move |ctx| {
            before.lock().push(format!("before {}", ctx.meta.name));
            async { Ok(()) }
        })
        .on_after_command(move |_ctx, output| {
            after.lock().push(format!("after {}", output.unwrap_or_default()));
            async { Ok(()) }
        });
    let out = app().hooks(hooks).run(["--message", "done"]).await.unwrap();
    assert_eq!(out.as_deref(), Some("done"));
    assert_eq!(*trace.lock(), ["before echo", "after done"]);
}

#[tokio::test]
async fn before_hook_failure_skips_the_command() {
    let ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&ran);
    let command = CommandDef::new("guarded").handler(move |_ctx| {
        *flag.lock() = true;
        async { Ok(None) }
    });
    let hooks = Hooks::new().on_before_command(|_ctx| async { Err(anyhow!("not allowed")) });
    let err = App::new(command)
        .hooks(hooks)
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::Hook { hook: "onBeforeCommand", .. }));
    assert!(!*ran.lock());
}

#[tokio::test]
async fn error_hook_decides_the_outcome() {
    let failing = || CommandDef::new("flaky").handler(|_ctx| async { Err(anyhow!("boom")) });

    let recovered = App::new(failing())
        .hooks(Hooks::new().on_error_command(|_ctx, err| async move {
            Ok(Some(format!("recovered from {err}")))
        }))
        .run(Vec::<String>::new())
        .await
        .unwrap();
    assert_eq!(recovered.as_deref(), Some("recovered from boom"));

    let replaced = App::new(failing())
        .hooks(Hooks::new().on_error_command(|_ctx, err| async move {
            Err(err.context("flaky failed"))
        }))
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    assert_eq!(replaced.to_string(), "flaky failed");

    let plain = App::new(failing())
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    assert_eq!(plain.to_string(), "boom");
}

#[tokio::test]
async fn plugin_commands_are_routable() {
    let adds = Plugin::new("extra").setup(|ctx: SetupContext| async move {
        ctx.add_command(
            CommandDef::new("ping")
                .about("Reply with pong")
                .handler(|ctx| async move { Ok(Some(format!("pong from {:?}", ctx.meta.path))) }),
        )?;
        Ok::<_, anyhow::Error>(())
    });
    let out = app().plugin(adds).run(["ping"]).await.unwrap();
    assert_eq!(out.as_deref(), Some("pong from [\"ping\"]"));
}

#[tokio::test]
async fn plugin_cannot_shadow_app_commands() {
    let shadow = Plugin::new("shadow").setup(|ctx: SetupContext| async move {
        ctx.add_command(CommandDef::new("echo"))?;
        Ok::<_, anyhow::Error>(())
    });
    let err = app().plugin(shadow).run(Vec::<String>::new()).await.unwrap_err();
    assert!(matches!(err, CliError::PluginSetup { .. }));
}

#[tokio::test]
async fn global_options_reach_every_command() {
    let verbose = Plugin::new("verbose").setup(|ctx: SetupContext| async move {
        ctx.add_global_option("verbose", ArgSchema::boolean().short('V'))?;
        Ok::<_, anyhow::Error>(())
    });
    let status = CommandDef::new("status").handler(|ctx| async move {
        Ok(Some(format!("verbose={}", ctx.flag("verbose"))))
    });
    let out = app()
        .sub_command(status)
        .plugin(verbose)
        .run(["status", "-V"])
        .await
        .unwrap();
    assert_eq!(out.as_deref(), Some("verbose=true"));
}

#[tokio::test]
async fn globals_render_help_and_version() {
    let app = app().plugin(globals());

    let version = app.run(["--version"]).await.unwrap();
    assert_eq!(version.as_deref(), Some("2.0.0"));

    let help = app.run(["-h"]).await.unwrap().unwrap();
    assert!(help.starts_with("tool (2.0.0)\nIntegration test app"));
    assert!(help.contains("USAGE:\n  tool <OPTIONS>"));
    assert!(help.contains("--message"));
    assert!(help.contains("Display this help message"));
}

#[tokio::test]
async fn globals_report_validation_errors() {
    let command = CommandDef::new("deploy")
        .arg("target", ArgSchema::string().required())
        .handler(|_ctx| async { Ok(Some("deployed".to_string())) });
    let out = App::new(command)
        .name("tool")
        .plugin(globals())
        .run(Vec::<String>::new())
        .await
        .unwrap()
        .unwrap();
    assert!(out.starts_with("tool\n\n"));
    assert!(out.contains("'target'"));
    assert!(!out.contains("deployed"));
}

#[tokio::test]
async fn timing_records_runs_and_logs() {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(MakeLogWriter(buf.clone()))
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let recorder = Arc::new(RunRecorder::default());
    let app = app()
        .plugin(timing_into(Arc::clone(&recorder)))
        .plugin(globals());
    app.run(["-m", "one"]).await.unwrap();
    // answered by the globals plugin, which wraps the timer
    app.run(["--version"]).await.unwrap();

    let runs = recorder.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].command, "echo");
    assert!(runs[0].succeeded);

    let logs = String::from_utf8(buf.lock().clone()).unwrap();
    assert!(logs.contains("command finished"));
    assert!(logs.contains("run_id"));
}

#[tokio::test]
async fn disabled_plugins_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[cli]\nname = \"renamed\"\n\n[plugins]\ndisabled = [\"base\"]\n",
    )
    .unwrap();
    let config = AppConfig::load(&path).unwrap();

    let trace = Trace::default();
    let err = app()
        .plugin(traced("base", &[], &trace))
        .plugin(traced("child", &["base"], &trace))
        .with_config(&config)
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(&err, CliError::MissingDependency { dependency, .. } if dependency.as_str() == "base"));

    let app = app().plugin(traced("base", &[], &trace)).with_config(&config);
    assert_eq!(app.env().name.as_deref(), Some("renamed"));
    assert!(app.active_plugins().is_empty());
}

#[tokio::test]
async fn setup_failure_skips_remaining_phases() {
    let trace = Trace::default();
    let stage = |id: &'static str, fail: bool, trace: &Trace| {
        let on_setup = Arc::clone(trace);
        let on_build = Arc::clone(trace);
        Plugin::new(id)
            .setup(move |_ctx: SetupContext| {
                on_setup.lock().push(format!("setup {id}"));
                async move {
                    if fail {
                        Err(anyhow!("{id} failed"))
                    } else {
                        Ok(())
                    }
                }
            })
            .extension(move |_ctx| {
                on_build.lock().push(format!("extension {id}"));
                async { Ok(()) }
            })
    };
    let err = app()
        .plugin(stage("first", false, &trace))
        .plugin(stage("broken", true, &trace))
        .plugin(stage("last", false, &trace))
        .run(Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(&err, CliError::PluginSetup { plugin, .. } if plugin.as_str() == "broken"));
    assert_eq!(*trace.lock(), ["setup first", "setup broken"]);
}

#[tokio::test]
async fn later_plugins_cannot_erase_earlier_registrations() {
    let eraser = Plugin::new("eraser")
        .depends_on(GLOBALS_ID)
        .setup(|ctx: SetupContext| async move {
            let own = SetupRegistry::new(ctx.env().clone())
                .with_reserved_commands(Vec::<String>::new());
            let detached = own.open(ctx.plugin_id().clone());
            detached.add_command(CommandDef::new("echo"))?;
            detached.add_global_option("version", ArgSchema::string())?;
            Ok::<_, anyhow::Error>(())
        });
    let app = app().plugin(eraser).plugin(globals());

    assert_eq!(app.run(["--version"]).await.unwrap().as_deref(), Some("2.0.0"));
    assert_eq!(
        app.run(["-m", "still here"]).await.unwrap().as_deref(),
        Some("still here")
    );
}

#[tokio::test]
async fn setup_handles_expire_with_the_callback() {
    let stash: Arc<Mutex<Option<SetupContext>>> = Arc::default();
    let keep = Arc::clone(&stash);
    let hoarder = Plugin::new("hoarder").setup(move |ctx: SetupContext| {
        *keep.lock() = Some(ctx);
        async { Ok(()) }
    });
    app().plugin(hoarder).run(Vec::<String>::new()).await.unwrap();

    let ctx = stash.lock().take().unwrap();
    assert_eq!(
        ctx.add_global_option("late", ArgSchema::boolean()),
        Err(SetupError::Closed("hoarder".into()))
    );
}

#[tokio::test]
async fn absent_optional_dependency_leaves_no_entry() {
    let seen = Arc::new(Mutex::new(None));
    let record = Arc::clone(&seen);
    let reader = Plugin::new("reader")
        .depends_on(Dependency::optional("cache"))
        .extension(move |ctx| {
            *record.lock() = Some(ctx.extensions.contains("cache"));
            async { Ok("reader ready") }
        });
    let command = CommandDef::new("inspect").handler(|ctx| async move {
        let mut ids: Vec<String> = ctx.extensions.ids().map(ToString::to_string).collect();
        ids.sort();
        let cached = ctx.extension::<()>("cache").is_some();
        Ok(Some(format!("{} cache={cached}", ids.join(","))))
    });
    let out = App::new(command)
        .plugin(reader)
        .run(Vec::<String>::new())
        .await
        .unwrap();
    assert_eq!(out.as_deref(), Some("reader cache=false"));
    assert_eq!(*seen.lock(), Some(false));
}

fn tagged(tag: &'static str) -> impl Fn(Renderer) -> Renderer + Send + Sync + 'static {
    move |next: Renderer| {
        renderer(move |ctx| {
            let next = next.clone();
            async move { next(ctx).await.map(|text| format!("[{tag}] {text}")) }
        })
    }
}

#[tokio::test]
async fn renderer_chains_stay_separate() {
    let styled = Plugin::new("styled")
        .depends_on(GLOBALS_ID)
        .setup(|ctx: SetupContext| async move {
            ctx.decorate_header_renderer(tagged("header"))?;
            ctx.decorate_usage_renderer(tagged("usage"))?;
            ctx.decorate_validation_errors_renderer(|next: ValidationErrorsRenderer| {
                validation_errors_renderer(move |ctx, errors| {
                    let next = next.clone();
                    async move {
                        next(ctx, errors)
                            .await
                            .map(|text| format!("[errors] {text}"))
                    }
                })
            })?;
            Ok::<_, anyhow::Error>(())
        });
    let command = CommandDef::new("deploy")
        .about("Deploy a build")
        .arg("target", ArgSchema::string().required())
        .handler(|_ctx| async { Ok(Some("deployed".to_string())) });
    let app = App::new(command)
        .name("tool")
        .version("2.0.0")
        .plugin(styled)
        .plugin(globals());

    let help = app.run(["--help", "--target", "prod"]).await.unwrap().unwrap();
    assert!(help.starts_with("[header] tool (2.0.0)\n\n[usage] Deploy a build"));
    assert_eq!(help.matches("[header]").count(), 1);
    assert_eq!(help.matches("[usage]").count(), 1);
    assert!(!help.contains("[errors]"));

    let failed = app.run(Vec::<String>::new()).await.unwrap().unwrap();
    assert_eq!(failed, "[header] tool (2.0.0)\n\n[errors] 'target' is required");
}
