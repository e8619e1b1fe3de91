fn main() {
    stlr::cli::run();
}
