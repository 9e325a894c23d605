//! Dispatcher Tests
//!
//! Tests for end-to-end dispatch against a scripted execution core.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use relaykv::dispatch::{CallRef, Dispatcher, Resolver};
use relaykv::protocol::{ConnectResponse, EncodedArgs};
use relaykv::{ClientHandle, CommandResult, ErrorKind, ExecutionCore, RelayError, RequestType};

// =============================================================================
// Scripted Core
// =============================================================================

#[derive(Debug)]
struct Submission {
    handle: ClientHandle,
    call_ref: CallRef,
    request: RequestType,
    args: Vec<String>,
}

/// Records submissions; the test decides when and how they complete
struct ScriptedCore {
    submissions: Sender<Submission>,
    reject: bool,
}

impl ScriptedCore {
    fn new() -> (Self, Receiver<Submission>) {
        let (sender, receiver) = channel::unbounded();
        (
            Self {
                submissions: sender,
                reject: false,
            },
            receiver,
        )
    }

    fn rejecting() -> (Self, Receiver<Submission>) {
        let (mut core, receiver) = Self::new();
        core.reject = true;
        (core, receiver)
    }
}

impl ExecutionCore for ScriptedCore {
    fn establish(&self, _config: &[u8]) -> ConnectResponse {
        ConnectResponse::Connected(ClientHandle::from_raw(1))
    }

    fn submit(
        &self,
        handle: ClientHandle,
        call_ref: CallRef,
        request: RequestType,
        args: &EncodedArgs,
    ) -> relaykv::Result<()> {
        if self.reject {
            return Err(RelayError::Closing("engine is shutting down".to_string()));
        }
        self.submissions
            .send(Submission {
                handle,
                call_ref,
                request,
                args: args.to_strings(),
            })
            .unwrap();
        Ok(())
    }

    fn release(&self, _handle: ClientHandle) {}
}

const HANDLE: ClientHandle = ClientHandle::from_raw(1);

/// Complete every submission by echoing its arguments back
fn spawn_echo(resolver: Arc<Resolver>, submissions: Receiver<Submission>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for submission in submissions.iter() {
            resolver
                .on_success(submission.call_ref, submission.args.join(" "))
                .unwrap();
        }
    })
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_dispatch_delivers_value() {
    let resolver = Arc::new(Resolver::new());
    let (core, submissions) = ScriptedCore::new();
    let echo = spawn_echo(Arc::clone(&resolver), submissions);

    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);
    let result = dispatcher.dispatch(RequestType::Echo, &["hello", "world"]);

    assert_eq!(result, Ok(CommandResult::value("hello world")));
    assert_eq!(resolver.outstanding(), 0);

    drop(core);
    echo.join().unwrap();
}

#[test]
fn test_dispatch_passes_request_and_handle() {
    let resolver = Resolver::new();
    let (core, submissions) = ScriptedCore::new();
    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);

    thread::scope(|scope| {
        scope.spawn(|| {
            let submission = submissions.recv().unwrap();
            assert_eq!(submission.handle, HANDLE);
            assert_eq!(submission.request, RequestType::SetString);
            assert_eq!(submission.args, vec!["k".to_string(), "v".to_string()]);
            resolver.on_success(submission.call_ref, "OK").unwrap();
        });

        assert_eq!(
            dispatcher.dispatch(RequestType::SetString, &["k", "v"]),
            Ok(CommandResult::value("OK"))
        );
    });
}

#[test]
fn test_dispatch_zero_arguments() {
    let resolver = Resolver::new();
    let (core, submissions) = ScriptedCore::new();
    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);

    thread::scope(|scope| {
        scope.spawn(|| {
            let submission = submissions.recv().unwrap();
            assert_eq!(submission.request, RequestType::Ping);
            assert!(submission.args.is_empty());
            resolver.on_success(submission.call_ref, "PONG").unwrap();
        });

        assert_eq!(
            dispatcher.dispatch(RequestType::Ping, &[]),
            Ok(CommandResult::value("PONG"))
        );
    });
}

#[test]
fn test_dispatch_delivers_failure() {
    let resolver = Resolver::new();
    let (core, submissions) = ScriptedCore::new();
    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);

    thread::scope(|scope| {
        scope.spawn(|| {
            let submission = submissions.recv().unwrap();
            resolver.on_failure(submission.call_ref, "no such key").unwrap();
        });

        let result = dispatcher.dispatch(RequestType::GetString, &["missing"]).unwrap();
        assert_eq!(
            result.into_result(),
            Err(RelayError::Request("no such key".to_string()))
        );
    });
}

#[test]
fn test_rejected_submission_frees_slot() {
    let resolver = Resolver::new();
    let (core, submissions) = ScriptedCore::rejecting();
    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);

    let result = dispatcher.dispatch(RequestType::Ping, &[]);

    assert_eq!(
        result,
        Err(RelayError::Closing("engine is shutting down".to_string()))
    );
    assert_eq!(resolver.outstanding(), 0);
    assert!(submissions.try_recv().is_err());
}

#[test]
fn test_unencodable_arguments_never_reach_engine() {
    let resolver = Resolver::new();
    let (core, submissions) = ScriptedCore::new();
    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);

    let result = dispatcher.dispatch(RequestType::SetString, &["key", "va\0lue"]);

    assert!(matches!(result, Err(RelayError::Encoding(_))));
    assert!(submissions.try_recv().is_err());
    assert_eq!(resolver.outstanding(), 0);
}

#[test]
fn test_timeout_discards_late_completion() {
    let resolver = Resolver::new();
    let (core, submissions) = ScriptedCore::new();
    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);

    let result = dispatcher.dispatch_with_timeout(
        RequestType::GetString,
        &["slow"],
        Duration::from_millis(20),
    );

    assert_eq!(result.unwrap().error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(resolver.outstanding(), 0);

    let submission = submissions.recv().unwrap();
    assert_eq!(
        resolver.on_success(submission.call_ref, "too late"),
        Err(RelayError::UnknownCall(submission.call_ref.as_raw()))
    );
}

#[test]
fn test_timeout_not_reached() {
    let resolver = Arc::new(Resolver::new());
    let (core, submissions) = ScriptedCore::new();
    let echo = spawn_echo(Arc::clone(&resolver), submissions);

    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);
    let result =
        dispatcher.dispatch_with_timeout(RequestType::Echo, &["quick"], Duration::from_secs(5));

    assert_eq!(result, Ok(CommandResult::value("quick")));

    drop(core);
    echo.join().unwrap();
}

#[test]
fn test_concurrent_dispatch_completed_in_random_order() {
    const CALLS: usize = 1000;
    const KINDS: [ErrorKind; 5] = [
        ErrorKind::Closing,
        ErrorKind::Request,
        ErrorKind::Timeout,
        ErrorKind::ExecAbort,
        ErrorKind::Connection,
    ];

    let resolver = Arc::new(Resolver::new());
    let (core, submissions) = ScriptedCore::new();

    // Hold every completion until all calls are in flight, then shuffle and
    // resolve each one as a value, a plain failure or a tagged error.
    let completer = {
        let resolver = Arc::clone(&resolver);
        thread::spawn(move || {
            let mut rng = rand::rng();
            let mut batch: Vec<Submission> = submissions.iter().take(CALLS).collect();
            batch.shuffle(&mut rng);

            let mut expected = HashMap::with_capacity(CALLS);
            for submission in batch {
                let id: usize = submission.args[0].parse().unwrap();
                let outcome = match rng.random_range(0..3) {
                    0 => {
                        let reply = format!("reply-{}", id);
                        resolver.on_success(submission.call_ref, reply.clone()).unwrap();
                        CommandResult::value(reply)
                    }
                    1 => {
                        let message = format!("failed-{}", id);
                        resolver.on_failure(submission.call_ref, message.clone()).unwrap();
                        CommandResult::error(ErrorKind::Request, message)
                    }
                    _ => {
                        let kind = *KINDS.choose(&mut rng).unwrap();
                        let message = format!("{:?}-{}", kind, id);
                        resolver.on_error(submission.call_ref, kind, message.clone()).unwrap();
                        CommandResult::error(kind, message)
                    }
                };
                expected.insert(id, outcome);
            }
            expected
        })
    };

    let dispatcher = Dispatcher::new(&core, &resolver, HANDLE);
    let results: Vec<(usize, relaykv::Result<CommandResult>)> = thread::scope(|scope| {
        let callers: Vec<_> = (0..CALLS)
            .map(|i| {
                let dispatcher = &dispatcher;
                thread::Builder::new()
                    .stack_size(256 * 1024)
                    .spawn_scoped(scope, move || {
                        let id = i.to_string();
                        (i, dispatcher.dispatch(RequestType::Echo, &[id.as_str()]))
                    })
                    .unwrap()
            })
            .collect();

        callers.into_iter().map(|caller| caller.join().unwrap()).collect()
    });

    let mut expected = completer.join().unwrap();
    assert_eq!(expected.len(), CALLS);
    for (i, result) in results {
        assert_eq!(result, Ok(expected.remove(&i).unwrap()));
    }
    assert_eq!(resolver.outstanding(), 0);
}
