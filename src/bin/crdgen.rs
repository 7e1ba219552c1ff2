use cloudflare_zero_trust_operator::crd::CloudflareAccessGroup;
use kube::CustomResourceExt;

fn main() {
    print!(
        "{}",
        serde_yaml::to_string(&CloudflareAccessGroup::crd()).unwrap()
    );
}
