fn main() {
    lodestar::cli::run();
}
