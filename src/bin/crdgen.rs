use kube::CustomResourceExt;
use app_operator::crd::Application;

fn main() {
    print!("{}", serde_yaml::to_string(&Application::crd()).unwrap());
}
