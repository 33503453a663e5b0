use ember_winit_app::app::WinitApp;

fn main() {
    // 第一个参数是可选的 TOML 配置文件
    let config_path = std::env::args().nth(1);

    if let Err(e) = WinitApp::run(config_path.as_deref()) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
