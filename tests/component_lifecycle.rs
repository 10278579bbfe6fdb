use phloem::{BuildError, Config, Definition, DeriveMode, HookKind, Instance, Node, Options, Patcher, Phase, Raw, Scheduler, Source, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

mod recording_adapter_;
use recording_adapter_::{Op, RecordingAdapter};

fn static_builder(text: &'static str) -> impl Fn(&Instance) -> Result<Raw, BuildError> {
	move |_: &Instance| Ok(Node::element("div", Config::new(), vec![Node::text(text)]).into())
}

#[test]
fn mount_fires_hooks_in_order() {
	let events = Rc::new(RefCell::new(Vec::new()));
	let push = |events: &Rc<RefCell<Vec<&'static str>>>, event: &'static str| {
		let events = events.clone();
		move |_: &Instance| events.borrow_mut().push(event)
	};

	let def = Definition::base(
		Options::new()
			.with_hook(HookKind::Created, push(&events, "created"))
			.with_hook(HookKind::BeforeBuild, push(&events, "before build"))
			.with_hook(HookKind::Built, push(&events, "built"))
			.with_hook(HookKind::Mounted, push(&events, "mounted"))
			.with_builder(static_builder("hi")),
	);

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let target = patcher.adapter_mut().root();

	let instance = Instance::new(&def);
	assert_eq!(*events.borrow(), ["created"]);
	assert_eq!(instance.phase(), Phase::Configuring);

	instance.mount(&mut patcher, target).unwrap();
	assert_eq!(*events.borrow(), ["created", "before build", "built", "mounted"]);
	assert_eq!(instance.phase(), Phase::Mounted);
	assert_eq!(patcher.adapter().snapshot(target), "#root[<div>[hi]]");
}

#[test]
fn rerender_diffs_against_the_stored_previous_tree() {
	let count = Rc::new(Cell::new(0_i64));
	let builder = {
		let count = count.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			Ok(Node::element("div", Config::new(), vec![Node::text(count.get().to_string())]).into())
		}
	};
	let def = Definition::base(Options::new().with_builder(builder));

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let target = patcher.adapter_mut().root();
	let instance = Instance::new(&def);
	let handle = instance.mount(&mut patcher, target).unwrap();

	count.set(7);
	patcher.adapter_mut().clear_ops();
	let same = instance.rerender(&mut patcher).unwrap();

	assert_eq!(handle, same);
	assert_eq!(patcher.adapter().ops, [Op::SetText("7".to_owned())]);
}

#[test]
fn builder_failure_leaves_the_previous_tree_authoritative() {
	let fail = Rc::new(Cell::new(false));
	let builder = {
		let fail = fail.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			if fail.get() {
				Err(BuildError::new("state not ready"))
			} else {
				Ok(Node::element("div", Config::new(), vec![Node::text("stable")]).into())
			}
		}
	};
	let def = Definition::base(Options::new().with_builder(builder));

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let target = patcher.adapter_mut().root();
	let instance = Instance::new(&def);
	instance.mount(&mut patcher, target).unwrap();

	fail.set(true);
	patcher.adapter_mut().clear_ops();
	assert!(instance.rerender(&mut patcher).is_err());
	assert!(patcher.adapter().ops.is_empty(), "no partial tree may be committed");
	assert_eq!(instance.phase(), Phase::Mounted);
	assert_eq!(patcher.adapter().snapshot(target), "#root[<div>[stable]]");

	fail.set(false);
	instance.rerender(&mut patcher).unwrap();
	assert_eq!(patcher.adapter().snapshot(target), "#root[<div>[stable]]");
}

fn labelled_item_def(base: &Definition, builds: &Rc<Cell<u32>>) -> Definition {
	let builds = builds.clone();
	let source = Source::new(Options::new().with_name("labelled-item").with_builder(move |instance: &Instance| -> Result<Raw, BuildError> {
		builds.set(builds.get() + 1);
		let label = match instance.prop("label") {
			Some(Value::Str(label)) => label,
			_ => "?".to_owned(),
		};
		Ok(Node::element("li", Config::new(), vec![Node::text(label)]).into())
	}));
	base.derive(&source, DeriveMode::Lenient).unwrap()
}

#[test]
fn placeholders_mount_and_update_child_instances() {
	let base = Definition::base(Options::new());
	let child_builds = Rc::new(Cell::new(0));
	let item = labelled_item_def(&base, &child_builds);

	let label = Rc::new(RefCell::new("one".to_owned()));
	let root_builder = {
		let label = label.clone();
		let item = item.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			Ok(Node::element(
				"ul",
				Config::new(),
				vec![Node::component(&item, Config::new().with("label", label.borrow().clone()), vec![])],
			)
			.into())
		}
	};
	let root_def = Definition::base(Options::new().with_builder(root_builder));

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let target = patcher.adapter_mut().root();
	let root = Instance::new(&root_def);
	root.mount(&mut patcher, target).unwrap();

	assert_eq!(child_builds.get(), 1);
	assert_eq!(patcher.adapter().snapshot(target), "#root[<ul>[<li>[one]]]");

	// Unchanged placeholder config: the child neither rebuilds nor touches the surface.
	patcher.adapter_mut().clear_ops();
	root.rerender(&mut patcher).unwrap();
	assert_eq!(child_builds.get(), 1);
	assert!(patcher.adapter().ops.is_empty(), "{:?}", patcher.adapter().ops);

	// Changed placeholder config: the child re-renders and patches only its text.
	*label.borrow_mut() = "two".to_owned();
	root.rerender(&mut patcher).unwrap();
	assert_eq!(child_builds.get(), 2);
	assert_eq!(patcher.adapter().ops, [Op::SetText("two".to_owned())]);
	assert_eq!(patcher.adapter().snapshot(target), "#root[<ul>[<li>[two]]]");
}

#[test]
fn scheduler_coalesces_repeat_requests() {
	let builds = Rc::new(Cell::new(0));
	let builder = {
		let builds = builds.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			builds.set(builds.get() + 1);
			Ok(Node::element("div", Config::new(), vec![]).into())
		}
	};
	let def = Definition::base(Options::new().with_builder(builder));

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let target = patcher.adapter_mut().root();
	let instance = Instance::new(&def);
	instance.mount(&mut patcher, target).unwrap();
	assert_eq!(builds.get(), 1);

	let scheduler = Scheduler::new();
	instance.invalidate(&scheduler);
	instance.invalidate(&scheduler);
	instance.invalidate(&scheduler);
	assert_eq!(scheduler.pending(), 1);

	scheduler.flush(&mut patcher).unwrap();
	assert_eq!(builds.get(), 2, "three requests must coalesce into one cycle");
	assert_eq!(scheduler.pending(), 0);
}

#[test]
fn flush_runs_ancestors_before_descendants() {
	let order = Rc::new(RefCell::new(Vec::new()));
	let tagged_builder = |order: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str| {
		let order = order.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			order.borrow_mut().push(tag);
			Ok(Node::element("div", Config::new(), vec![]).into())
		}
	};

	let elder_def = Definition::base(Options::new().with_builder(tagged_builder(&order, "elder")));
	let younger_def = Definition::base(Options::new().with_builder(tagged_builder(&order, "younger")));

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let elder_target = patcher.adapter_mut().root();
	let younger_target = patcher.adapter_mut().root();

	// Creation order fixes the ids; ids fix the flush order.
	let elder = Instance::new(&elder_def);
	let younger = Instance::new(&younger_def);
	elder.mount(&mut patcher, elder_target).unwrap();
	younger.mount(&mut patcher, younger_target).unwrap();
	order.borrow_mut().clear();

	let scheduler = Scheduler::new();
	younger.invalidate(&scheduler);
	elder.invalidate(&scheduler);
	scheduler.flush(&mut patcher).unwrap();

	assert_eq!(*order.borrow(), ["elder", "younger"]);
}

#[test]
fn destroying_with_a_pending_update_drops_the_patch() {
	let builds = Rc::new(Cell::new(0));
	let builder = {
		let builds = builds.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			builds.set(builds.get() + 1);
			Ok(Node::element("div", Config::new(), vec![Node::text("x")]).into())
		}
	};
	let def = Definition::base(Options::new().with_builder(builder));

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let target = patcher.adapter_mut().root();
	let instance = Instance::new(&def);
	instance.mount(&mut patcher, target).unwrap();

	let scheduler = Scheduler::new();
	instance.invalidate(&scheduler);
	instance.teardown(&mut patcher);
	assert_eq!(instance.phase(), Phase::Destroyed);

	patcher.adapter_mut().clear_ops();
	scheduler.flush(&mut patcher).unwrap();

	assert_eq!(builds.get(), 1, "no cycle may run against a destroyed instance");
	assert!(patcher.adapter().ops.is_empty());
}

#[test]
fn teardown_cascades_through_child_instances() {
	let base = Definition::base(Options::new());
	let destroyed = Rc::new(Cell::new(false));
	let item = {
		let destroyed = destroyed.clone();
		let source = Source::new(
			Options::new()
				.with_name("leaf")
				.with_hook(HookKind::Destroyed, move |_: &Instance| destroyed.set(true))
				.with_builder(static_builder("leaf")),
		);
		base.derive(&source, DeriveMode::Lenient).unwrap()
	};

	let root_builder = {
		let item = item.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			Ok(Node::element("section", Config::new(), vec![Node::component(&item, Config::new(), vec![])]).into())
		}
	};
	let root_def = Definition::base(Options::new().with_builder(root_builder));

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let target = patcher.adapter_mut().root();
	let root = Instance::new(&root_def);
	root.mount(&mut patcher, target).unwrap();
	assert_eq!(patcher.adapter().snapshot(target), "#root[<section>[<div>[leaf]]]");

	root.teardown(&mut patcher);
	assert!(destroyed.get());
	assert_eq!(root.phase(), Phase::Destroyed);
	assert_eq!(patcher.adapter().children_of(target), Vec::<u64>::new());
}

#[test]
fn flush_failures_are_instance_granular() {
	let sound_builds = Rc::new(Cell::new(0));
	let sound_builder = {
		let sound_builds = sound_builds.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			sound_builds.set(sound_builds.get() + 1);
			Ok(Node::element("div", Config::new(), vec![]).into())
		}
	};
	let broken_once = Rc::new(Cell::new(false));
	let broken_builder = {
		let broken_once = broken_once.clone();
		move |_: &Instance| -> Result<Raw, BuildError> {
			if broken_once.get() {
				Err(BuildError::new("broken"))
			} else {
				Ok(Node::element("div", Config::new(), vec![]).into())
			}
		}
	};

	let mut patcher = Patcher::new(RecordingAdapter::new());
	let broken = Instance::new(&Definition::base(Options::new().with_builder(broken_builder)));
	let sound = Instance::new(&Definition::base(Options::new().with_builder(sound_builder)));
	let broken_target = patcher.adapter_mut().root();
	let sound_target = patcher.adapter_mut().root();
	broken.mount(&mut patcher, broken_target).unwrap();
	sound.mount(&mut patcher, sound_target).unwrap();

	broken_once.set(true);
	let scheduler = Scheduler::new();
	broken.invalidate(&scheduler);
	sound.invalidate(&scheduler);

	let error = scheduler.flush(&mut patcher).unwrap_err();
	assert_eq!(error.failures.len(), 1);
	assert_eq!(error.failures[0].0, broken.id());
	assert_eq!(sound_builds.get(), 2, "the healthy instance still flushed");
}
