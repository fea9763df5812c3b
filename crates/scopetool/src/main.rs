#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> miette::Result<()> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.expect("tokio runtime")
		.block_on(async {
			let (args, _guard) = scopetool::args()?;
			scopetool::run(args).await
		})
}
