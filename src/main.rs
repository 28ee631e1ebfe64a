fn main() -> anyhow::Result<()> {
    eyegaze_lib::run()
}
