/// Carries the argument structs down through nested subcommand dispatch.
#[derive(Clone, Debug)]
pub struct Context<A = (), B = ()> {
	pub args_top: A,
	pub args_sub: B,
}

impl Context {
	pub fn new() -> Self {
		Self { args_top: (), args_sub: () }
	}
}

impl<A, B> Context<A, B> {
	pub fn with_top<C>(self, args_top: C) -> Context<C, B> {
		Context::<C, B> { args_top, args_sub: self.args_sub }
	}
}
